//! Platform interceptors
//!
//! Replacements for JDK and platform methods that either do not exist on the
//! host runtime or must be deterministic under test.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{error, warn};
use umbra_sdk::{ArrayRef, CallContext, CallError, CallResult, Exception, RealObject, TypeKind, Value};

use super::cleaner::CleanerInterceptor;
use super::clock::FakeClock;
use super::{Interceptor, MethodRef};

/// First host runtime major version without `sun.misc.Cleaner`
pub const CLEANER_MIN_HOST_VERSION: u32 = 9;

/// Factory for the standard interceptor set
pub struct AndroidInterceptors;

impl AndroidInterceptors {
    /// Every standard interceptor; the cleaner mapping is only included on
    /// hosts at or above [`CLEANER_MIN_HOST_VERSION`]
    pub fn all(host_runtime_version: u32, clock: &Arc<FakeClock>) -> Vec<Arc<dyn Interceptor>> {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(LinkedHashMapEldestInterceptor::new()),
            Arc::new(SystemTimeInterceptor::new(Arc::clone(clock))),
            Arc::new(SystemArrayCopyInterceptor::new()),
            Arc::new(LocaleAdjustLanguageCodeInterceptor::new()),
            Arc::new(SystemLogInterceptor::new()),
            Arc::new(FileDescriptorInterceptor::new()),
            Arc::new(NoOpInterceptor::new()),
            Arc::new(SocketInterceptor::new()),
        ];
        if host_runtime_version >= CLEANER_MIN_HOST_VERSION {
            interceptors.push(Arc::new(CleanerInterceptor::new()));
        }
        interceptors
    }
}

// ============================================================================
// LinkedHashMap.eldest
// ============================================================================

/// Field of a `LinkedHashMap` object holding its entries in insertion order
pub const LINKED_HASH_MAP_ENTRIES_FIELD: &str = "entries";

/// `LinkedHashMap.eldest()` → first entry, or null when empty
pub struct LinkedHashMapEldestInterceptor {
    refs: Vec<MethodRef>,
}

impl LinkedHashMapEldestInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![MethodRef::new("java.util.LinkedHashMap", "eldest")],
        }
    }
}

impl Interceptor for LinkedHashMapEldestInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        let map = ctx.this()?;
        Ok(match map.get_field(LINKED_HASH_MAP_ENTRIES_FIELD) {
            Value::Array(entries) => entries.lock().first().cloned().unwrap_or_default(),
            _ => Value::Null,
        })
    }
}

// ============================================================================
// System time
// ============================================================================

/// `System.nanoTime()` / `System.currentTimeMillis()` from a [`FakeClock`]
pub struct SystemTimeInterceptor {
    refs: Vec<MethodRef>,
    clock: Arc<FakeClock>,
}

impl SystemTimeInterceptor {
    /// Serve time from `clock`
    pub fn new(clock: Arc<FakeClock>) -> Self {
        Self {
            refs: vec![
                MethodRef::new("java.lang.System", "nanoTime"),
                MethodRef::new("java.lang.System", "currentTimeMillis"),
            ],
            clock,
        }
    }
}

impl Interceptor for SystemTimeInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, method_name: &str, _ctx: &CallContext<'_>) -> CallResult {
        match method_name {
            "nanoTime" => Ok(Value::Long(self.clock.nano_time())),
            "currentTimeMillis" => Ok(Value::Long(self.clock.current_time_millis())),
            other => Err(Exception::unsupported_operation(format!("System.{}", other)).into()),
        }
    }
}

// ============================================================================
// System.arraycopy
// ============================================================================

/// `System.arraycopy(src, srcPos, dest, destPos, length)`
pub struct SystemArrayCopyInterceptor {
    refs: Vec<MethodRef>,
}

impl SystemArrayCopyInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![MethodRef::new("java.lang.System", "arraycopy")],
        }
    }
}

fn array_arg<'a>(ctx: &CallContext<'a>, index: usize) -> Result<&'a ArrayRef, CallError> {
    match ctx.arg(index)? {
        Value::Array(array) => Ok(array),
        Value::Null => Err(Exception::null_pointer("arraycopy: null array").into()),
        other => Err(Exception::array_store(format!("arraycopy: {} is not an array", other.kind())).into()),
    }
}

impl Interceptor for SystemArrayCopyInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        let src = array_arg(ctx, 0)?;
        let src_pos = ctx.arg_int(1)?;
        let dest = array_arg(ctx, 2)?;
        let dest_pos = ctx.arg_int(3)?;
        let length = ctx.arg_int(4)?;

        let in_bounds = |src_len: usize, dest_len: usize| {
            src_pos >= 0
                && dest_pos >= 0
                && length >= 0
                && src_pos as i64 + length as i64 <= src_len as i64
                && dest_pos as i64 + length as i64 <= dest_len as i64
        };
        let bounds_error = |src_len: usize, dest_len: usize| -> CallError {
            Exception::array_index_out_of_bounds(format!(
                "arraycopy: copy of {} from {} (length {}) to {} (length {})",
                length, src_pos, src_len, dest_pos, dest_len
            ))
            .into()
        };

        if Arc::ptr_eq(src, dest) {
            let mut items = src.lock();
            if !in_bounds(items.len(), items.len()) {
                return Err(bounds_error(items.len(), items.len()));
            }
            let (from, to, n) = (src_pos as usize, dest_pos as usize, length as usize);
            let copied: Vec<Value> = items[from..from + n].to_vec();
            items[to..to + n].clone_from_slice(&copied);
        } else {
            // address order, so copies in opposite directions cannot deadlock
            let (from_items, mut to_items) = if Arc::as_ptr(src) < Arc::as_ptr(dest) {
                let from_items = src.lock();
                (from_items, dest.lock())
            } else {
                let to_items = dest.lock();
                (src.lock(), to_items)
            };
            if !in_bounds(from_items.len(), to_items.len()) {
                return Err(bounds_error(from_items.len(), to_items.len()));
            }
            let (from, to, n) = (src_pos as usize, dest_pos as usize, length as usize);
            to_items[to..to + n].clone_from_slice(&from_items[from..from + n]);
        }
        Ok(Value::Null)
    }
}

// ============================================================================
// Locale.adjustLanguageCode
// ============================================================================

/// `Locale.adjustLanguageCode(code)`: lowercase, with the new ISO codes for
/// Hebrew, Indonesian and Yiddish mapped to their obsolete forms
pub struct LocaleAdjustLanguageCodeInterceptor {
    refs: Vec<MethodRef>,
}

impl LocaleAdjustLanguageCodeInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![MethodRef::new("java.util.Locale", "adjustLanguageCode")],
        }
    }

    /// The adjustment itself
    pub fn adjust_language_code(code: &str) -> String {
        match code {
            "he" => "iw".to_string(),
            "id" => "in".to_string(),
            "yi" => "ji".to_string(),
            other => other.to_lowercase(),
        }
    }
}

impl Interceptor for LocaleAdjustLanguageCodeInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        let code = ctx
            .arg_str(0)?
            .ok_or_else(|| Exception::null_pointer("language code"))?;
        Ok(Value::from(Self::adjust_language_code(code)))
    }
}

// ============================================================================
// System.logE / System.logW
// ============================================================================

/// `System.logE(msg[, throwable])` / `System.logW(...)` routed to `tracing`
pub struct SystemLogInterceptor {
    refs: Vec<MethodRef>,
}

impl SystemLogInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![
                MethodRef::new("java.lang.System", "logE"),
                MethodRef::new("java.lang.System", "logW"),
            ],
        }
    }

    /// Render at most the message and one throwable after `prefix`
    pub fn format(prefix: &str, args: &[Value]) -> String {
        let mut message = String::from(prefix);
        for (i, arg) in args.iter().take(2).enumerate() {
            match arg {
                Value::Str(s) => message.push_str(s),
                Value::Object(obj) if i > 0 => {
                    message.push('\n');
                    message.push_str(obj.class_name());
                    if let Value::Str(detail) = obj.get_field("message") {
                        message.push_str(": ");
                        message.push_str(&detail);
                    }
                }
                Value::Null => message.push_str("null"),
                other => message.push_str(&format!("{:?}", other)),
            }
        }
        message
    }
}

impl Interceptor for SystemLogInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        match method_name {
            "logE" => error!("{}", Self::format("System.logE: ", ctx.args)),
            "logW" => warn!("{}", Self::format("System.logW: ", ctx.args)),
            _ => {}
        }
        Ok(Value::Null)
    }
}

// ============================================================================
// FileDescriptor.release$
// ============================================================================

/// `FileDescriptor.release$()`: moves ownership of the descriptor into a new
/// object and leaves the receiver invalid
pub struct FileDescriptorInterceptor {
    refs: Vec<MethodRef>,
}

impl FileDescriptorInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![MethodRef::new("java.io.FileDescriptor", "release$")],
        }
    }
}

impl Interceptor for FileDescriptorInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        let input = ctx.this()?;
        let released = RealObject::new(input.class_name());
        for (field, moved_out) in [
            ("fd", Value::Int(-1)),
            ("closed", Value::Bool(false)),
            ("parent", Value::Null),
            ("otherParents", Value::Null),
        ] {
            released.set_field(field, input.get_field(field));
            input.set_field(field, moved_out);
        }
        Ok(Value::Object(released))
    }
}

// ============================================================================
// No-op
// ============================================================================

/// Methods that must do nothing under test; returns the default value of
/// the method's return kind
pub struct NoOpInterceptor {
    refs: Vec<MethodRef>,
    returns: FxHashMap<MethodRef, TypeKind>,
}

impl NoOpInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        let declared = [
            (MethodRef::new("java.lang.System", "loadLibrary"), TypeKind::Void),
            (MethodRef::new("android.os.StrictMode", "trackActivity"), TypeKind::Any),
            (MethodRef::new("android.os.StrictMode", "incrementExpectedActivityCount"), TypeKind::Void),
            (MethodRef::new("android.util.LocaleUtil", "getLayoutDirectionFromLocale"), TypeKind::Int),
        ];
        let mut refs: Vec<MethodRef> = declared.iter().map(|(r, _)| r.clone()).collect();
        refs.push(MethodRef::any("android.view.FallbackEventHandler"));
        refs.push(MethodRef::any("android.view.IWindowSession"));
        Self {
            refs,
            returns: declared.into_iter().collect(),
        }
    }
}

impl Interceptor for NoOpInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        Ok(ctx.method.ret.default_value())
    }

    fn return_kind(&self, owner: &str, method_name: &str) -> Option<TypeKind> {
        self.returns.get(&MethodRef::new(owner, method_name)).cloned()
    }
}

// ============================================================================
// Socket.getFileDescriptor$
// ============================================================================

/// `Socket.getFileDescriptor$()` → null
pub struct SocketInterceptor {
    refs: Vec<MethodRef>,
}

impl SocketInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![MethodRef::new("java.net.Socket", "getFileDescriptor$")],
        }
    }
}

impl Interceptor for SocketInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, _ctx: &CallContext<'_>) -> CallResult {
        Ok(Value::Null)
    }
}
