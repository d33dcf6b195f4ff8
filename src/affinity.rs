//! CPU affinity masks.
//!
//! Masks are bit sets over logical CPUs: bit `n` allows CPU `n`. They are
//! written in decimal (`63` = CPUs 0–5) or as `0x`-prefixed hex.
//!
//! Supported on Linux (`sched_setaffinity`) and Windows
//! (`SetProcessAffinityMask`). Elsewhere applying a mask fails with
//! [`FramePipeError::Affinity`], which callers treat as a warning.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    process::{Child, Command},
    str::FromStr,
};

use crate::error::FramePipeError;

/// A non-empty set of logical CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffinityMask(u64);

impl AffinityMask {
    /// Wrap a raw mask.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::Affinity`] for the empty mask.
    pub fn new(bits: u64) -> Result<Self, FramePipeError> {
        if bits == 0 {
            return Err(FramePipeError::Affinity(
                "affinity mask must select at least one CPU".to_string(),
            ));
        }
        Ok(Self(bits))
    }

    /// The raw bit set.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Selected CPU indices in ascending order.
    pub fn cpus(self) -> impl Iterator<Item = usize> {
        (0..64).filter(move |cpu| self.0 & (1 << cpu) != 0)
    }
}

impl FromStr for AffinityMask {
    type Err = FramePipeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        let bits = parsed
            .map_err(|_| FramePipeError::Affinity(format!("invalid affinity mask: {value:?}")))?;
        Self::new(bits)
    }
}

impl Display for AffinityMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Pin the current process.
///
/// On Linux this pins the calling thread; threads spawned afterwards inherit
/// the mask, so call it before starting any.
///
/// # Errors
///
/// Returns [`FramePipeError::Affinity`] if the OS rejects the mask or the
/// platform is unsupported.
pub fn apply_to_current_process(mask: AffinityMask) -> Result<(), FramePipeError> {
    sys::set_current(mask)
}

/// Arrange for a command's process to start with `mask` applied.
///
/// Where the mask can only be applied after spawning, this is a no-op and
/// [`apply_to_child`] does the work.
pub fn prepare_command(command: &mut Command, mask: AffinityMask) {
    sys::prepare_command(command, mask);
}

/// Apply `mask` to a freshly spawned child, where [`prepare_command`] could
/// not.
///
/// # Errors
///
/// Returns [`FramePipeError::Affinity`] if the OS rejects the mask.
pub fn apply_to_child(child: &Child, mask: AffinityMask) -> Result<(), FramePipeError> {
    sys::apply_to_child(child, mask)
}

#[cfg(target_os = "linux")]
mod sys {
    use std::{
        io,
        os::unix::process::CommandExt,
        process::{Child, Command},
    };

    use super::AffinityMask;
    use crate::error::FramePipeError;

    fn cpu_set(mask: AffinityMask) -> libc::cpu_set_t {
        // SAFETY: cpu_set_t is a plain bit array; all-zero is the empty set.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        for cpu in mask.cpus() {
            // SAFETY: cpu < 64, well inside CPU_SETSIZE.
            unsafe { libc::CPU_SET(cpu, &mut set) };
        }
        set
    }

    fn set_for_pid(pid: libc::pid_t, set: &libc::cpu_set_t) -> io::Result<()> {
        // SAFETY: `set` is a valid, initialised cpu_set_t of the given size.
        let result =
            unsafe { libc::sched_setaffinity(pid, std::mem::size_of::<libc::cpu_set_t>(), set) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub(super) fn set_current(mask: AffinityMask) -> Result<(), FramePipeError> {
        set_for_pid(0, &cpu_set(mask))
            .map_err(|error| FramePipeError::Affinity(format!("cannot set affinity {mask}: {error}")))
    }

    pub(super) fn prepare_command(command: &mut Command, mask: AffinityMask) {
        let set = cpu_set(mask);
        // SAFETY: the hook only issues the sched_setaffinity syscall, which is
        // async-signal-safe, and touches no heap state.
        unsafe {
            command.pre_exec(move || set_for_pid(0, &set));
        }
    }

    pub(super) fn apply_to_child(_child: &Child, _mask: AffinityMask) -> Result<(), FramePipeError> {
        // Already applied between fork and exec.
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use std::{
        os::windows::io::AsRawHandle,
        process::{Child, Command},
    };

    use windows::Win32::{
        Foundation::HANDLE,
        System::Threading::{GetCurrentProcess, SetProcessAffinityMask},
    };

    use super::AffinityMask;
    use crate::error::FramePipeError;

    fn set(process: HANDLE, mask: AffinityMask) -> Result<(), FramePipeError> {
        // SAFETY: `process` is a live process handle owned by the caller.
        unsafe { SetProcessAffinityMask(process, mask.bits() as usize) }
            .map_err(|error| FramePipeError::Affinity(format!("cannot set affinity {mask}: {error}")))
    }

    pub(super) fn set_current(mask: AffinityMask) -> Result<(), FramePipeError> {
        // SAFETY: the pseudo handle is always valid for the current process.
        set(unsafe { GetCurrentProcess() }, mask)
    }

    pub(super) fn prepare_command(_command: &mut Command, _mask: AffinityMask) {}

    pub(super) fn apply_to_child(child: &Child, mask: AffinityMask) -> Result<(), FramePipeError> {
        set(HANDLE(child.as_raw_handle()), mask)
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod sys {
    use std::process::{Child, Command};

    use super::AffinityMask;
    use crate::error::FramePipeError;

    fn unsupported(mask: AffinityMask) -> FramePipeError {
        FramePipeError::Affinity(format!(
            "cannot set affinity {mask}: not supported on this platform"
        ))
    }

    pub(super) fn set_current(mask: AffinityMask) -> Result<(), FramePipeError> {
        Err(unsupported(mask))
    }

    pub(super) fn prepare_command(_command: &mut Command, _mask: AffinityMask) {}

    pub(super) fn apply_to_child(_child: &Child, mask: AffinityMask) -> Result<(), FramePipeError> {
        Err(unsupported(mask))
    }
}
