// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{any::Any, cell::Cell, fmt::Display};
use std::{panic, sync::Once, thread_local};

/// A panic caught while running an operation under test.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PanicInfo {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl PanicInfo {
    pub(crate) fn location(&self) -> Option<String> {
        (!self.file.is_empty()).then(|| format!("{}:{}:{}", self.file, self.line, self.column))
    }
}

/// Run `func`, turning a panic into [`PanicInfo`] without printing it.
pub(crate) fn catch_silent<T>(func: impl FnOnce() -> T) -> Result<T, PanicInfo> {
    let f = panic::AssertUnwindSafe(|| {
        let _guard = SilentPanicGuard::new();
        (func)()
    });
    panic::catch_unwind(f).map_err(|e| {
        let message = panic_message(e);
        let (file, line, column) = SilentPanicGuard::take_location();
        PanicInfo {
            message,
            file,
            line,
            column,
        }
    })
}

pub(crate) fn panic_message(e: Box<dyn Any + Send>) -> String {
    let s = match e.downcast::<String>() {
        Ok(s) => *s,
        Err(e) => match e.downcast::<&str>() {
            Ok(s) => (*s).into(),
            Err(e) => {
                if let Ok(d) = e.downcast::<&dyn Display>() {
                    (*d).to_string()
                } else {
                    "<panic with unexpected payload>".into()
                }
            }
        },
    };
    if s.trim().is_empty() {
        "<panic with empty payload>".into()
    } else {
        s
    }
}

type PanicHook = Box<dyn Fn(&panic::PanicHookInfo<'_>) + Send + Sync>;

struct SilentPanicGuard {
    _private: (),
}

impl SilentPanicGuard {
    thread_local! {
        static SILENCE_PANICS: Cell<u32> = const { Cell::new(0) };
        static PANIC_LOCATION: Cell<(String, u32, u32)> = const { Cell::new((String::new(), 0, 0)) };
    }

    fn new() -> Self {
        static PANIC_HOOK_ONCE: Once = Once::new();
        PANIC_HOOK_ONCE.call_once(|| {
            let prev_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                Self::hook(&prev_hook, info);
            }));
        });

        Self::SILENCE_PANICS.with(|c| c.update(|v| v + 1));

        Self { _private: () }
    }

    fn hook(prev_hook: &PanicHook, info: &panic::PanicHookInfo) {
        if Self::SILENCE_PANICS.get() > 0 {
            if let Some(loc) = info.location() {
                Self::PANIC_LOCATION.set((loc.file().into(), loc.line(), loc.column()));
            }
        } else {
            prev_hook(info);
        }
    }

    fn take_location() -> (String, u32, u32) {
        Self::PANIC_LOCATION.take()
    }
}

impl Drop for SilentPanicGuard {
    fn drop(&mut self) {
        Self::SILENCE_PANICS.with(|c| c.update(|v| v - 1));
    }
}

#[cfg(test)]
mod tests {
    use super::catch_silent;

    #[test]
    fn catches_message_and_location() {
        let Err(err) = catch_silent(|| -> u8 { panic!("boom {}", 7) }) else {
            panic!("expected a panic");
        };
        assert_eq!(err.message, "boom 7");
        assert!(err.location().is_some_and(|l| l.contains("unwind.rs")));
    }

    #[test]
    fn passes_value_through() {
        assert_eq!(catch_silent(|| 5), Ok(5));
    }
}
