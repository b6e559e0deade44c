//! Diagnostic log formatting.
//!
//! Every line the collector emits about itself is prefixed `logship` so it
//! can be told apart from the tenant log traffic it moves around. Any active
//! spans are folded into a single bracketed segment before the message:
//!
//! ```text
//! logship | INFO | client connects with identifier "apple"
//! logship | WARN | [session{path=/p1/log.sock}] oversized version message, msg size is 11264
//! ```

use std::fmt;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Formatter producing `logship | LEVEL | [span context] message` lines.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl Formatter {
    /// Fold the active span stack, outermost first, into one bracketed
    /// segment like `[accept{path=/a.sock} session]`. Empty when the event
    /// fired outside any span.
    fn span_context<S, N>(ctx: &FmtContext<'_, S, N>) -> String
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let Some(scope) = ctx.event_scope() else {
            return String::new();
        };

        let segments: Vec<String> = scope
            .from_root()
            .map(|span| {
                let extensions = span.extensions();
                match extensions.get::<FormattedFields<N>>() {
                    Some(fields) if !fields.is_empty() => {
                        format!("{}{{{fields}}}", span.name())
                    }
                    _ => span.name().to_string(),
                }
            })
            .collect();

        if segments.is_empty() {
            String::new()
        } else {
            format!("[{}] ", segments.join(" "))
        }
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "logship | {} | {}",
            event.metadata().level(),
            Formatter::span_context(ctx)
        )?;

        // FmtContext renders the message and event fields itself.
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber. HTTP plumbing is kept quiet regardless of
/// the requested level.
pub fn init(level: &str) {
    let directives = format!("h2=off,hyper=off,reqwest=off,{level}");
    let filter =
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_env_filter(filter)
        .init();
}
