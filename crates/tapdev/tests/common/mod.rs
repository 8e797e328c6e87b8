//! Common test utilities for integration tests.
//!
//! Provides unique interface names and helper macros for conditional test
//! execution.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tapdev::TapDevice;

/// Global counter for unique interface names.
static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate an interface name unique to this process and test.
///
/// Stays well inside the 15-byte limit.
pub fn unique_name(prefix: &str) -> String {
    let id = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id() % 100_000;
    format!("{prefix}{pid}x{id}")
}

/// Check whether `name` is in the kernel's interface list.
pub fn interface_exists(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).exists()
}

/// Check if running as root with a TUN clone device available.
pub fn can_create_devices() -> bool {
    (unsafe { libc::geteuid() } == 0) && Path::new(tapdev::TUN_DEVICE_PATH).exists()
}

/// Wait until the device is readable, or give up after `timeout`.
pub fn wait_readable(device: &TapDevice, timeout: Duration) -> bool {
    let fd = device.file_descriptor().expect("device is open");
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as libc::c_int) };
    ret > 0 && pfd.revents & libc::POLLIN != 0
}

/// Skip the test if interfaces can't be created here.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::can_create_devices() {
            eprintln!("Skipping test: requires root and /dev/net/tun");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name() {
        let name1 = unique_name("tdt");
        let name2 = unique_name("tdt");
        assert_ne!(name1, name2);
        assert!(name1.len() <= 15);
        assert!(tapdev::validate_name(&name1).is_ok());
    }
}
