// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{Debug, Display};
use std::sync::{Once, OnceLock};

use crate::{OutputCapture, Rand, rand::random_seed};

const VAR_PREFIX: &str = "CALLCHAIN_";

const DEBUG_CHECKS_VAR: &str = "CALLCHAIN_DEBUG_CHECKS";
const CAPTURE_OUTPUT_VAR: &str = "CALLCHAIN_CAPTURE_OUTPUT";
const STRICT_EXCEPTIONS_VAR: &str = "CALLCHAIN_STRICT_EXCEPTIONS";
const STRING_MAXLEN_VAR: &str = "CALLCHAIN_STRING_MAXLEN";
const RNG_SEED_VAR: &str = "CALLCHAIN_RNG_SEED";

const KNOWN_CONFIG_VARS: &[&str] = &[
    DEBUG_CHECKS_VAR,
    CAPTURE_OUTPUT_VAR,
    STRICT_EXCEPTIONS_VAR,
    STRING_MAXLEN_VAR,
    RNG_SEED_VAR,
];

const DEBUG_CHECKS_DEFAULT: bool = false;
const CAPTURE_OUTPUT_DEFAULT: bool = false;
const STRICT_EXCEPTIONS_DEFAULT: bool = false;
pub(crate) const STRING_MAXLEN_DEFAULT: usize = 10000;

fn param_fallback<T: Debug, E: Display>(
    name: &'static str,
    default_: T,
    use_ev: Option<&OnceLock<String>>,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> T {
    let s = if let Some(ev) = use_ev {
        ev.get_or_init(|| std::env::var(name).unwrap_or_default())
    } else {
        ""
    };
    if s.is_empty() {
        return default_;
    }
    let r = parse(s);
    r.unwrap_or_else(|e| {
        log::warn!(
            target: "callchain::config",
            "failed to parse {name} value {s:?}, using default {default_:?} ({e})"
        );
        default_
    })
}

fn parse_bool(s: &str) -> Result<bool, &'static str> {
    match s {
        "true" | "on" | "yes" | "y" | "1" => Ok(true),
        "false" | "off" | "no" | "n" | "0" => Ok(false),
        _ => Err("invalid boolean value"),
    }
}

fn warn_unknown_vars() {
    static CHECK_ENV_ONCE: Once = Once::new();
    CHECK_ENV_ONCE.call_once(|| {
        for (var, _) in std::env::vars_os() {
            if let Some(var) = var.to_str()
                && var.starts_with(VAR_PREFIX)
                && !KNOWN_CONFIG_VARS.contains(&var)
            {
                log::warn!(
                    target: "callchain::config",
                    "unknown environment variable {var}, ignoring"
                );
            }
        }
    });
}

fn debug_checks_fallback(use_ev: bool) -> bool {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        DEBUG_CHECKS_VAR,
        DEBUG_CHECKS_DEFAULT,
        use_ev.then_some(&ENV),
        parse_bool,
    )
}

fn capture_output_fallback(use_ev: bool) -> bool {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        CAPTURE_OUTPUT_VAR,
        CAPTURE_OUTPUT_DEFAULT,
        use_ev.then_some(&ENV),
        parse_bool,
    )
}

fn strict_exceptions_fallback(use_ev: bool) -> bool {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        STRICT_EXCEPTIONS_VAR,
        STRICT_EXCEPTIONS_DEFAULT,
        use_ev.then_some(&ENV),
        parse_bool,
    )
}

fn string_maxlen_fallback(use_ev: bool) -> usize {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        STRING_MAXLEN_VAR,
        STRING_MAXLEN_DEFAULT,
        use_ev.then_some(&ENV),
        |s| {
            let mut s = s.to_owned();
            s.retain(|c| c != '_');
            s.parse()
        },
    )
}

fn rng_seed_fallback(use_ev: bool) -> Option<u64> {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(RNG_SEED_VAR, None, use_ev.then_some(&ENV), |s| {
        u64::from_str_radix(s, 16).map(Some)
    })
}

/// Whether O(n) representation checks run on every sequence construction
/// (`CALLCHAIN_DEBUG_CHECKS`).
pub(crate) fn debug_checks_enabled() -> bool {
    debug_checks_fallback(true)
}

/// Maximum length of a string literal (`CALLCHAIN_STRING_MAXLEN`).
pub(crate) fn string_maxlen() -> usize {
    string_maxlen_fallback(true)
}

/// Per-run execution policy, produced by [`Config::options`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Treat an exceptional outcome before the final statement as a fatal error.
    pub strict: bool,
    /// Where to capture output written by operations; discarded when `None`.
    pub capture: Option<OutputCapture>,
}

/// Custom configuration for sequence execution and variable selection.
#[must_use]
#[derive(Debug, Default)]
pub struct Config {
    capture_output: Option<bool>,
    strict_exceptions: Option<bool>,
    seed: Option<u64>,
}

impl Config {
    /// Override output capture.
    pub fn with_capture_output(mut self, enabled: bool) -> Self {
        self.capture_output = Some(enabled);
        self
    }

    /// Override strict handling of exceptions before the final statement.
    pub fn with_strict_exceptions(mut self, enabled: bool) -> Self {
        self.strict_exceptions = Some(enabled);
        self
    }

    /// Override random seed used for variable selection.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build execution options.
    ///
    /// Values set explicitly win; otherwise, when `use_env_vars` is true,
    /// `CALLCHAIN_CAPTURE_OUTPUT` and `CALLCHAIN_STRICT_EXCEPTIONS` are
    /// consulted; otherwise defaults (no capture, early termination) apply.
    #[must_use]
    pub fn options(&self, use_env_vars: bool) -> ExecOptions {
        if use_env_vars {
            warn_unknown_vars();
        }
        let capture = self
            .capture_output
            .unwrap_or_else(|| capture_output_fallback(use_env_vars));
        let strict = self
            .strict_exceptions
            .unwrap_or_else(|| strict_exceptions_fallback(use_env_vars));
        ExecOptions {
            strict,
            capture: capture.then(OutputCapture::new),
        }
    }

    /// Build the random generator for variable and component selection.
    ///
    /// Seed comes from [`Config::with_rng_seed`], then (when `use_env_vars`)
    /// hexadecimal `CALLCHAIN_RNG_SEED`, then a fresh random value.
    #[must_use]
    pub fn rng(&self, use_env_vars: bool) -> Rand {
        if use_env_vars {
            warn_unknown_vars();
        }
        let seed = self
            .seed
            .unwrap_or_else(|| rng_seed_fallback(use_env_vars).unwrap_or_else(random_seed));
        log::debug!(target: "callchain::config", "rng seed {seed:x}");
        Rand::new(seed)
    }
}
