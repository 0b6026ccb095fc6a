//! Placeholder resolution.
//!
//! Turns tokenized segments into concrete text for one document. Every
//! random placeholder draws fresh values from the supplied RNG.

use crate::context::GenerationContext;
use crate::error::TemplateError;
use crate::token::{parse_call, PlaceholderToken, Segment};
use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use rand::Rng;

/// Shortest length drawn for `#{random_string}`.
pub const RANDOM_STRING_MIN_LEN: usize = 10;

/// Longest length drawn for `#{random_string}`.
pub const RANDOM_STRING_MAX_LEN: usize = 999;

/// Resolve segments into text.
///
/// Fails only when a call whose arguments hold placeholders resolves to
/// malformed arguments.
pub fn resolve<R: Rng + ?Sized>(
    segments: &[Segment],
    ctx: &GenerationContext<'_>,
    rng: &mut R,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    resolve_into(&mut out, segments, ctx, rng)?;
    Ok(out)
}

fn resolve_into<R: Rng + ?Sized>(
    out: &mut String,
    segments: &[Segment],
    ctx: &GenerationContext<'_>,
    rng: &mut R,
) -> Result<(), TemplateError> {
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::EscapedHash => out.push('#'),
            Segment::Placeholder(token) => resolve_token(out, token, ctx, rng)?,
        }
    }
    Ok(())
}

fn resolve_token<R: Rng + ?Sized>(
    out: &mut String,
    token: &PlaceholderToken,
    ctx: &GenerationContext<'_>,
    rng: &mut R,
) -> Result<(), TemplateError> {
    match token {
        PlaceholderToken::IdCounterRef => out.push_str(&ctx.doc_id_counter.to_string()),
        PlaceholderToken::PrefixRef(kind) => out.push_str(ctx.prefix(*kind)),
        PlaceholderToken::RandomInt { min, max } => {
            out.push_str(&generate_int_range(rng, *min, *max).to_string())
        }
        PlaceholderToken::RandomString { len } => {
            let len = len.unwrap_or_else(|| {
                rng.random_range(RANDOM_STRING_MIN_LEN..=RANDOM_STRING_MAX_LEN)
            });
            out.push_str(&generate_string(rng, len));
        }
        PlaceholderToken::Pick(options) => {
            if let Some(choice) = pick(rng, options) {
                out.push_str(choice);
            }
        }
        // File references and conditionals survive as markers; the attachment
        // resolver and the conditional evaluator consume them after parsing.
        PlaceholderToken::FileRef(path) => {
            out.push_str("#{file(");
            out.push_str(path);
            out.push_str(")}");
        }
        PlaceholderToken::Conditional { expr } => {
            out.push_str("#{if(");
            resolve_into(out, expr, ctx, rng)?;
            out.push_str(")}");
        }
        PlaceholderToken::Call { kind, args } => {
            let args = resolve(args, ctx, rng)?;
            let raw = format!("#{{{}({args})}}", kind.name());
            let token = parse_call(*kind, &args, &raw)?;
            resolve_token(out, &token, ctx, rng)?;
        }
    }
    Ok(())
}

/// Uniform integer in `[min, max]`.
pub fn generate_int_range<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    rng.random_range(min..=max)
}

/// Random string over `[A-Za-z0-9]` of exactly `len` characters.
pub fn generate_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (&mut *rng)
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// One of `options`, chosen uniformly.
pub fn pick<'a, R: Rng + ?Sized>(rng: &mut R, options: &'a [String]) -> Option<&'a str> {
    options.choose(rng).map(String::as_str)
}
