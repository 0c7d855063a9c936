//! Command-line argument parsing
//!
//! Accepts any mix of these syntaxes, selected with [`ParseMode`]:
//! - `--flag` (stored as `"true"`)
//! - `--key=value`
//! - `--key value`
//! - `key=value`
//! - positional arguments, only before the first keyed argument unless
//!   [`ParseOptions::allow_positional_anywhere`] is set
//!
//! Parsing consumes tokens from a slice in place, so whatever follows a
//! `stop_at` sentinel is left for the caller.

use std::collections::HashMap;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Accepted syntaxes. An empty mode accepts all of them.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ParseMode: u8 {
        /// `--flag`
        const DASH        = 0b00_0001;
        /// `--key=value`
        const DASH_EQ     = 0b00_0010;
        /// `--key value`
        const DASH_VAL    = 0b00_0100;
        /// `key=value`
        const EQ          = 0b00_1000;
        const POSITIONAL  = 0b01_0000;
        /// `-flag` is taken as `--flag`
        const SINGLE_DASH = 0b10_0000;
    }
}

impl ParseMode {
    fn effective(self) -> Self {
        if self.is_empty() { Self::all() } else { self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("Need '--' instead of a single '-'")]
    SingleDash,
    #[error("Need a name after '-'")]
    EmptyFlag,
    #[error("Need key before '='")]
    MissingKey,
    #[error("Need value after '='")]
    MissingValue,
    #[error("Cannot have more than one '='")]
    MultipleEquals,
    #[error("Cannot have equal-sign in argument")]
    EqualsInFlag,
    #[error("Cannot start with '-'")]
    LeadingDash,
    #[error("Arg cannot contain '='")]
    PositionalWithEquals,
    #[error("Positional arguments should be put before other arguments")]
    PositionalAfterKeyed,
    #[error("'{0}' is already set")]
    DuplicateKey(String),
    #[error("Couldn't parse argument '{0}'")]
    Unparsed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub mode: ParseMode,
    /// Drop the first token (the program name) before parsing.
    pub ignore_first_arg: bool,
    /// Token that ends parsing. It is consumed; the rest is not.
    pub stop_at: Option<String>,
    pub allow_positional_anywhere: bool,
}

/// Keyed values in insertion order plus positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    positional: Vec<String>,
    values: HashMap<String, String>,
    order: Vec<String>,
    remaining: usize,
}

impl ParsedArguments {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool { self.values.contains_key(key) }
    pub fn positional(&self) -> &[String] { &self.positional }
    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Tokens left unconsumed after parsing stopped.
    pub fn remaining(&self) -> usize { self.remaining }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.as_str(), v.as_str())))
    }

    fn set(&mut self, key: &str, value: &str) {
        if self.values.insert(key.to_owned(), value.to_owned()).is_none() {
            self.order.push(key.to_owned());
        }
    }

    /// Inline assignments may not repeat a key.
    fn set_inline(&mut self, key: &str, value: &str) -> Result<(), ArgsError> {
        if self.values.contains_key(key) {
            return Err(ArgsError::DuplicateKey(key.to_owned()));
        }
        self.set(key, value);
        Ok(())
    }
}

/// Pops the first token off `args`.
pub fn shift_args<'a, S: AsRef<str>>(args: &mut &'a [S]) -> Option<&'a str> {
    let slice: &'a [S] = *args;
    let (first, rest) = slice.split_first()?;
    *args = rest;
    Some(first.as_ref())
}

pub fn parse_arguments<S: AsRef<str>>(
    opts: &ParseOptions,
    args: &mut &[S],
) -> Result<ParsedArguments, ArgsError> {
    let mode = opts.mode.effective();
    let mut parsed = ParsedArguments::default();
    let mut allow_positional = true;

    if opts.ignore_first_arg {
        shift_args(args);
    }

    while let Some(arg) = shift_args(args) {
        if opts.stop_at.as_deref() == Some(arg) {
            break;
        }

        if arg.starts_with('-')
            && mode.intersects(ParseMode::DASH | ParseMode::DASH_EQ | ParseMode::DASH_VAL)
            && parse_flag(arg, mode, args, &mut parsed)?
        {
            allow_positional = false;
            continue;
        }

        if mode.intersects(ParseMode::EQ | ParseMode::POSITIONAL) {
            if arg.starts_with('-') {
                return Err(ArgsError::LeadingDash);
            }
            if mode.contains(ParseMode::EQ) && arg.contains('=') {
                let (key, value) = split_assignment(arg)?;
                parsed.set_inline(key, value)?;
                allow_positional = false;
                continue;
            }
            if mode.contains(ParseMode::POSITIONAL) {
                if !allow_positional && !opts.allow_positional_anywhere {
                    return Err(ArgsError::PositionalAfterKeyed);
                }
                if arg.contains('=') {
                    return Err(ArgsError::PositionalWithEquals);
                }
                parsed.positional.push(arg.to_owned());
                continue;
            }
        }

        return Err(ArgsError::Unparsed(arg.to_owned()));
    }

    parsed.remaining = args.len();
    Ok(parsed)
}

/// Handles a token starting with `-`. Returns false if no enabled flag
/// syntax applies.
fn parse_flag<S: AsRef<str>>(
    arg: &str,
    mode: ParseMode,
    args: &mut &[S],
    parsed: &mut ParsedArguments,
) -> Result<bool, ArgsError> {
    let double = arg.starts_with("--");
    if !double && !mode.contains(ParseMode::SINGLE_DASH) {
        return Err(ArgsError::SingleDash);
    }
    let name = if double { &arg[2..] } else { &arg[1..] };

    if mode.contains(ParseMode::DASH_EQ) && name.contains('=') {
        let (key, value) = split_assignment(name)?;
        parsed.set_inline(key, value)?;
        return Ok(true);
    }
    if !mode.contains(ParseMode::DASH) {
        return Ok(false);
    }
    if name.contains('=') {
        return Err(ArgsError::EqualsInFlag);
    }
    if name.is_empty() {
        return Err(ArgsError::EmptyFlag);
    }

    // a following token is the value unless it looks like a flag itself
    if mode.contains(ParseMode::DASH_VAL) {
        let rest = *args;
        let next: Option<&str> = rest.first().map(|v| v.as_ref());
        if let Some(value) = next.filter(|v| !v.starts_with('-')) {
            parsed.set(name, value);
            shift_args(args);
            return Ok(true);
        }
    }
    parsed.set(name, "true");
    Ok(true)
}

fn split_assignment(s: &str) -> Result<(&str, &str), ArgsError> {
    let (key, value) = s.split_once('=').ok_or(ArgsError::MissingValue)?;
    if key.is_empty() {
        return Err(ArgsError::MissingKey);
    }
    if value.is_empty() {
        return Err(ArgsError::MissingValue);
    }
    if value.contains('=') {
        return Err(ArgsError::MultipleEquals);
    }
    Ok((key, value))
}
