//! C ABI for accelerated grayscale conversion.
//!
//! Exports `Grayscale(Pixel*, unsigned int)` and
//! `GrayscaleStatusString(int)`; see `include/grayscale.h`.
//!
//! The first call builds one process-wide [`Processor`] from the `GRAY_*`
//! environment variables. Set `GRAY_LOG` (an `EnvFilter` directive such as
//! `debug`) to send diagnostics to stderr.

use std::ffi::{CStr, c_char, c_int, c_uint};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, Once, OnceLock};

use tracing::{debug, error};

pub use gray_compute::{Pixel, Status};
use gray_compute::{ComputeResult, Processor};

/// Environment variable holding the log filter.
pub const ENV_LOG: &str = "GRAY_LOG";

static LOGGING: Once = Once::new();
static PROCESSOR: OnceLock<Processor> = OnceLock::new();
static PROCESSOR_INIT: Mutex<()> = Mutex::new(());

fn init_logging() {
    LOGGING.call_once(|| {
        if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_env(ENV_LOG) {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    });
}

/// Shared processor, or the status its construction failed with.
///
/// A failed construction is not cached; the next call tries again.
fn processor() -> Result<&'static Processor, Status> {
    init_once(&PROCESSOR, &PROCESSOR_INIT, Processor::from_env)
}

/// Fill `cell` from `init` unless it already holds a value.
///
/// `lock` serializes the attempts so `init` runs at most once at a time.
fn init_once(
    cell: &'static OnceLock<Processor>,
    lock: &Mutex<()>,
    init: impl FnOnce() -> ComputeResult<Processor>,
) -> Result<&'static Processor, Status> {
    if let Some(proc) = cell.get() {
        return Ok(proc);
    }

    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(proc) = cell.get() {
        return Ok(proc);
    }
    match init() {
        Ok(proc) => {
            debug!(backend = proc.backend_name(), "grayscale processor initialized");
            Ok(cell.get_or_init(|| proc))
        }
        Err(e) => {
            error!(error = %e, "failed to initialize grayscale processor");
            Err(e.status())
        }
    }
}

/// Convert `pixels` with the shared processor.
pub fn grayscale(pixels: &mut [Pixel]) -> Status {
    init_logging();
    if pixels.is_empty() {
        return Status::Success;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let proc = match processor() {
            Ok(p) => p,
            Err(status) => return status,
        };
        match proc.grayscale(pixels) {
            Ok(()) => Status::Success,
            Err(e) => e.status(),
        }
    }));

    result.unwrap_or_else(|_| {
        error!("panic during grayscale conversion");
        Status::Unknown
    })
}

/// Write the BT.601 luma of each of the `size` pixels at `data` into its
/// `gray` field.
///
/// Returns [`Status::InvalidValue`] for a null `data`, and
/// [`Status::Success`] without touching the device for `size == 0`.
///
/// # Safety
///
/// A non-null `data` must point to `size` initialized, writable pixels that
/// nothing else accesses for the duration of the call.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn Grayscale(data: *mut Pixel, size: c_uint) -> Status {
    init_logging();
    if data.is_null() {
        error!(size, "null pixel buffer");
        return Status::InvalidValue;
    }

    // SAFETY: non-null, and the caller guarantees `size` valid unaliased pixels.
    let pixels = unsafe { std::slice::from_raw_parts_mut(data, size as usize) };
    grayscale(pixels)
}

/// Static description of a status code.
///
/// Unknown codes map to `"unrecognized status code"`. The returned string
/// must not be freed.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "C" fn GrayscaleStatusString(status: c_int) -> *const c_char {
    status_cstr(status).as_ptr()
}

fn status_cstr(code: c_int) -> &'static CStr {
    Status::from_code(code).map_or(c"unrecognized status code", Status::description_cstr)
}
