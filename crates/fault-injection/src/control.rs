//! Error-injection controller: the global active gate, the write/metadata
//! Bernoulli injectors, the one-shot toggles, and the thread-local read-error
//! program (spec §3, §4.6).
//!
//! The active flag, sticky error, and the two rate-based injectors live in
//! [`FaultProgramming`], which the facade guards with its single mutex
//! (spec §5: "Facade mutex protects ... the write-error/metadata-error rate
//! counters, and the active flag"). The read-error program is the one piece
//! of state the spec calls out as thread-local, modeled here with
//! `std::thread_local!` rather than a process `static`, matching the rest of
//! this crate's avoidance of global mutable state (spec §9).

use std::cell::RefCell;
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::FsError;
use crate::file_type::FileType;

/// The operation a read-error injection decision is being made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    /// `RandomAccessFile::Read` / `SequentialFile::Read`.
    Read,
    /// The trailing, whole-batch call after a `MultiRead`.
    MultiRead,
    /// One sub-request within a `MultiRead` batch.
    MultiReadSingleReq,
    /// `NewRandomAccessFile` / `NewSequentialFile`.
    Open,
}

/// Outcome of a read-error injection decision.
#[derive(Debug, Clone, Default)]
pub struct ReadInjection {
    /// Set when the operation should fail outright.
    pub error: Option<FsError>,
    /// Set when the caller's result buffer should be replaced with an empty slice.
    pub empty_result: bool,
    /// Set when the caller's result buffer should have its last byte incremented.
    pub corrupt_last_byte: bool,
}

impl ReadInjection {
    fn none() -> Self {
        ReadInjection::default()
    }

    /// Whether any of the three outcomes fired.
    pub fn fired(&self) -> bool {
        self.error.is_some() || self.empty_result || self.corrupt_last_byte
    }
}

/// Per-thread read-error injection program (spec §3 `ErrorContext`).
struct ErrorContext {
    enabled: bool,
    one_in: u32,
    rng: StdRng,
    count: u64,
    last_message: String,
    last_frames: Vec<String>,
}

thread_local! {
    static ERROR_CONTEXT: RefCell<Option<ErrorContext>> = const { RefCell::new(None) };
}

/// Install (or replace) this thread's read-error program.
///
/// `one_in == 0` disables injection without dropping the context's counters.
pub fn set_read_error_program(one_in: u32, seed: u64) {
    ERROR_CONTEXT.with(|cell| {
        *cell.borrow_mut() = Some(ErrorContext {
            enabled: true,
            one_in,
            rng: StdRng::seed_from_u64(seed),
            count: 0,
            last_message: String::new(),
            last_frames: Vec::new(),
        });
    });
}

/// Disable this thread's read-error program without discarding its counters.
pub fn disable_read_error_program() {
    ERROR_CONTEXT.with(|cell| {
        if let Some(ctx) = cell.borrow_mut().as_mut() {
            ctx.enabled = false;
        }
    });
}

/// Number of injections this thread's program has recorded with
/// `need_count_increase`.
pub fn read_error_count() -> u64 {
    ERROR_CONTEXT.with(|cell| cell.borrow().as_ref().map(|c| c.count).unwrap_or(0))
}

/// The message left by the most recent injection on this thread, if any.
pub fn read_error_last_message() -> String {
    ERROR_CONTEXT.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|c| c.last_message.clone())
            .unwrap_or_default()
    })
}

/// The simulated call stack captured by the most recent injection on this thread.
pub fn read_error_last_frames() -> Vec<String> {
    ERROR_CONTEXT.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|c| c.last_frames.clone())
            .unwrap_or_default()
    })
}

/// Run the read-error injection state machine (spec §4.6) for `op`.
///
/// `need_count_increase` is `true` for the trailing whole-batch call of a
/// `MultiRead` iff none of its sub-requests injected, and always `true` for
/// `Read`/`Open`. `caller_owned_buffer` models "result.data == scratch" — the
/// caller passed its own backing buffer rather than a borrowed/zero-copy view.
pub fn maybe_inject_read_error(
    op: ReadOp,
    need_count_increase: bool,
    direct_io: bool,
    caller_owned_buffer: bool,
) -> ReadInjection {
    ERROR_CONTEXT.with(|cell| {
        let mut guard = cell.borrow_mut();
        let ctx = match guard.as_mut() {
            Some(c) if c.enabled && c.one_in > 0 => c,
            _ => return ReadInjection::none(),
        };

        if !ctx.rng.gen_ratio(1, ctx.one_in) {
            return ReadInjection::none();
        }

        if need_count_increase {
            ctx.count += 1;
        }
        ctx.last_frames = vec![format!("{op:?}")];

        if op != ReadOp::MultiReadSingleReq {
            ctx.last_message = "Injected read error".to_string();
            return ReadInjection {
                error: Some(FsError::injected_read_error()),
                empty_result: false,
                corrupt_last_byte: false,
            };
        }

        if ctx.rng.gen_ratio(1, 8) {
            ctx.last_message = "Injected empty read result".to_string();
            return ReadInjection {
                error: None,
                empty_result: true,
                corrupt_last_byte: false,
            };
        }

        if !direct_io && caller_owned_buffer && ctx.rng.gen_ratio(1, 7) {
            ctx.last_message = "Injected read corruption".to_string();
            return ReadInjection {
                error: None,
                empty_result: false,
                corrupt_last_byte: true,
            };
        }

        ctx.last_message = "Injected read error".to_string();
        ReadInjection {
            error: Some(FsError::injected_read_error()),
            empty_result: false,
            corrupt_last_byte: false,
        }
    })
}

/// Rate-based injector configuration for writes or metadata operations.
#[derive(Debug, Clone)]
struct RateInjector {
    one_in: u32,
    allowed_types: HashSet<FileType>,
    inject_for_all_file_types: bool,
}

/// Facade-global error programming: the active gate plus the two
/// rate-based injectors and the one-shot toggles (spec §3, §6).
///
/// Owned by the facade behind its single mutex; never a process global.
pub struct FaultProgramming {
    active: bool,
    sticky_error: FsError,
    write_error: Option<RateInjector>,
    metadata_error: Option<RateInjector>,
    corrupt_before_write: bool,
    unique_id_fail: bool,
    random_read_error: bool,
    rng: StdRng,
}

impl Default for FaultProgramming {
    fn default() -> Self {
        FaultProgramming {
            active: true,
            sticky_error: FsError::Inactive("Filesystem is not active".to_string()),
            write_error: None,
            metadata_error: None,
            corrupt_before_write: false,
            unique_id_fail: false,
            random_read_error: false,
            rng: StdRng::seed_from_u64(0x5EED),
        }
    }
}

impl FaultProgramming {
    /// Reset to the all-disabled, active default (spec's `ResetState`).
    pub fn reset(&mut self) {
        *self = FaultProgramming::default();
    }

    /// Close the active gate; every gated operation returns `error` until
    /// reactivated or reset.
    pub fn set_inactive(&mut self, error: FsError) {
        self.active = false;
        self.sticky_error = error;
    }

    /// Reopen the active gate.
    pub fn set_active(&mut self) {
        self.active = true;
    }

    /// The active gate check every intercepted operation performs first.
    pub fn check_active(&self) -> Result<(), FsError> {
        if self.active {
            Ok(())
        } else {
            Err(clone_sticky(&self.sticky_error))
        }
    }

    /// Enable write-error injection at rate `1/one_in` for the given file
    /// types (or all types when `inject_for_all_file_types` is set).
    pub fn enable_write_error(
        &mut self,
        one_in: u32,
        allowed_types: HashSet<FileType>,
        inject_for_all_file_types: bool,
    ) {
        self.write_error = Some(RateInjector {
            one_in,
            allowed_types,
            inject_for_all_file_types,
        });
    }

    /// Disable write-error injection.
    pub fn disable_write_error(&mut self) {
        self.write_error = None;
    }

    /// Enable metadata-write-error injection at rate `1/one_in`.
    pub fn enable_metadata_error(&mut self, one_in: u32) {
        self.metadata_error = Some(RateInjector {
            one_in,
            allowed_types: HashSet::new(),
            inject_for_all_file_types: true,
        });
    }

    /// Disable metadata-write-error injection.
    pub fn disable_metadata_error(&mut self) {
        self.metadata_error = None;
    }

    /// Decide whether to inject a write error for a file of type `file_type`
    /// (`None` when the basename did not parse).
    pub fn maybe_inject_write_error(&mut self, file_type: Option<FileType>) -> bool {
        let allowed = match (&self.write_error, file_type) {
            (None, _) => return false,
            (Some(w), _) if w.inject_for_all_file_types => true,
            (Some(_), None) => false,
            (Some(w), Some(ty)) => w.allowed_types.contains(&ty),
        };
        if !allowed {
            return false;
        }
        let one_in = self.write_error.as_ref().unwrap().one_in;
        one_in > 0 && self.rng.gen_ratio(1, one_in)
    }

    /// Decide whether to inject a metadata-write error.
    pub fn maybe_inject_metadata_error(&mut self) -> bool {
        match &self.metadata_error {
            None => false,
            Some(m) if m.one_in == 0 => false,
            Some(m) => self.rng.gen_ratio(1, m.one_in),
        }
    }

    /// Set the data-corruption-before-write toggle.
    pub fn set_corrupt_before_write(&mut self, on: bool) {
        self.corrupt_before_write = on;
    }

    /// Whether appends should be forced-corrupted before delegating.
    pub fn corrupt_before_write(&self) -> bool {
        self.corrupt_before_write
    }

    /// Set the unique-id-failure toggle.
    pub fn set_unique_id_fail(&mut self, on: bool) {
        self.unique_id_fail = on;
    }

    /// Whether `GetUniqueId` should report failure (return 0).
    pub fn unique_id_fail(&self) -> bool {
        self.unique_id_fail
    }

    /// Set the random-read-error toggle.
    pub fn set_random_read_error(&mut self, on: bool) {
        self.random_read_error = on;
    }

    /// Decide whether the random-read-error toggle fires this call.
    ///
    /// Unlike the rate injectors this toggle is an unconditional coin flip
    /// (1-in-2) once enabled, matching its role as a blunt "always might
    /// fail" switch rather than a tunable rate (spec §4.5/§4.7).
    pub fn maybe_random_read_error(&mut self) -> bool {
        self.random_read_error && self.rng.gen_bool(0.5)
    }
}

/// Clone an [`FsError`], which does not derive `Clone` because its `Io`
/// variant wraps a non-`Clone` `std::io::Error`. Used wherever one injected
/// error must be fanned out across several result slots (e.g. `MultiRead`).
pub(crate) fn clone_error(err: &FsError) -> FsError {
    clone_sticky(err)
}

fn clone_sticky(err: &FsError) -> FsError {
    match err {
        FsError::Inactive(m) => FsError::Inactive(m.clone()),
        FsError::IoError(m) => FsError::IoError(m.clone()),
        FsError::Corruption(m) => FsError::Corruption(m.clone()),
        FsError::NotFound(p) => FsError::NotFound(p.clone()),
        FsError::Io(e) => FsError::IoError(e.to_string()),
    }
}
