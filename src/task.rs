//! Core-pinned background tasks.
//!
//! On ESP-IDF, `std::thread` is backed by pthreads over FreeRTOS tasks, and
//! `esp_pthread_set_cfg()` sets the core affinity, priority and stack size of
//! the *next* thread created from the calling thread. The config→spawn pair
//! must therefore not be interleaved with other thread creation on the same
//! thread. Other targets fall back to a named `std::thread`.
//!
//! Spawning returns `io::Result` rather than panicking: a failed optional
//! task (the dispatcher) only disables its feature.

use std::io;
use std::thread::JoinHandle;

/// CPU cores of the ESP32 dual-core parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU) — protocol stacks (BLE controller, Bluedroid).
    Pro = 0,
    /// Core 1 (APP_CPU) — application work such as report delivery.
    App = 1,
}

/// Task parameters. `name` must be NUL-terminated (e.g. `"hid-send\0"`).
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

fn check(spec: &TaskSpec) -> io::Result<()> {
    if spec.stack_kb == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("task '{}' has no stack", spec.name.trim_end_matches('\0')),
        ));
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    check(&spec)?;
    // SAFETY: the config struct is fully initialised by the default
    // constructor and only read by the next pthread_create on this thread.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as _;
        cfg.thread_name = spec.name.as_ptr().cast();
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    let display_name = spec.name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        spec.core,
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
}

/// Floor for host thread stacks.
#[cfg(not(target_os = "espidf"))]
const SIM_MIN_STACK: usize = 64 * 1024;

/// Simulation fallback — ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    check(&spec)?;
    let display_name = spec.name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        display_name,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size((spec.stack_kb * 1024).max(SIM_MIN_STACK))
        .spawn(f)
}
