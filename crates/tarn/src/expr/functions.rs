//! The closed scalar function set.
//!
//! Every function enforces its arity and operand types; violations are
//! recorded with the argument's position and a safe default (null) comes
//! back. Arguments are evaluated by the caller.

use crate::context::QueryContext;
use tarn_core::{
    date,
    error::ValidationError,
    value::{Value, ValueKind},
};
use time::{Duration, Month, OffsetDateTime, Time};

pub(crate) fn call(name: &str, path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    match name {
        "concat" => concat(path, args, ctx),
        "substring" => substring(path, args, ctx),
        "length" => length(path, args, ctx),
        "lower" => text_unary(name, path, args, ctx, str::to_lowercase),
        "upper" => text_unary(name, path, args, ctx, str::to_uppercase),
        "trim" => text_unary(name, path, args, ctx, |s| s.trim().to_string()),
        "replace" => replace(path, args, ctx),
        "abs" => num_unary(name, path, args, ctx, f64::abs),
        "ceil" => num_unary(name, path, args, ctx, f64::ceil),
        "floor" => num_unary(name, path, args, ctx, f64::floor),
        "round" => round(path, args, ctx),
        "sqrt" => sqrt(path, args, ctx),
        "power" => power(path, args, ctx),
        "now" => now(path, args, ctx),
        "current_date" => current_date(path, args, ctx),
        "date_add" => date_shift(name, path, args, ctx, 1),
        "date_sub" => date_shift(name, path, args, ctx, -1),
        "extract" => extract(path, args, ctx),
        "date_trunc" => date_trunc(path, args, ctx),
        "coalesce" => coalesce(path, args, ctx),
        "nullif" => nullif(path, args, ctx),
        "greatest" => extreme(name, path, args, ctx, true),
        "least" => extreme(name, path, args, ctx, false),
        other => {
            ctx.record(ValidationError::new(
                path.to_string(),
                format!("Unknown function '{other}'"),
            ));
            Value::Null
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Argument plumbing
// ─────────────────────────────────────────────────────────────

fn check_arity(
    name: &str,
    path: &str,
    args: &[Value],
    min: usize,
    max: usize,
    ctx: &mut QueryContext<'_>,
) -> bool {
    if (min..=max).contains(&args.len()) {
        return true;
    }

    let expected = if min == max {
        format!("{min}")
    } else {
        format!("{min} to {max}")
    };
    ctx.record(ValidationError::new(
        path.to_string(),
        format!(
            "Function '{name}' expects {expected} argument(s), got {}",
            args.len()
        ),
    ));

    false
}

fn text_arg<'a>(
    name: &str,
    path: &str,
    args: &'a [Value],
    index: usize,
    ctx: &mut QueryContext<'_>,
) -> Option<&'a str> {
    match args[index].as_text() {
        Some(s) => Some(s),
        None => {
            ctx.record(
                ValidationError::new(
                    format!("{path}.args[{index}]"),
                    format!("Function '{name}' expects a string argument"),
                )
                .with_types(ValueKind::Text.to_string(), args[index].kind().to_string()),
            );
            None
        }
    }
}

fn num_arg(
    name: &str,
    path: &str,
    args: &[Value],
    index: usize,
    ctx: &mut QueryContext<'_>,
) -> Option<f64> {
    match args[index].as_number() {
        Some(n) => Some(n),
        None => {
            ctx.record(
                ValidationError::new(
                    format!("{path}.args[{index}]"),
                    format!("Function '{name}' expects a numeric argument"),
                )
                .with_types(ValueKind::Number.to_string(), args[index].kind().to_string()),
            );
            None
        }
    }
}

fn any_null(args: &[Value]) -> bool {
    args.iter().any(Value::is_null)
}

// ─────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────

fn concat(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("concat", path, args, 1, usize::MAX, ctx) || any_null(args) {
        return Value::Null;
    }

    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.display_string());
    }
    Value::Text(out)
}

fn substring(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("substring", path, args, 2, 3, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(text) = text_arg("substring", path, args, 0, ctx) else {
        return Value::Null;
    };
    let Some(start) = num_arg("substring", path, args, 1, ctx) else {
        return Value::Null;
    };
    let len = if args.len() == 3 {
        match num_arg("substring", path, args, 2, ctx) {
            Some(len) => Some(len),
            None => return Value::Null,
        }
    } else {
        None
    };

    // 1-based start, SQL style; out-of-range clamps rather than erroring.
    #[expect(clippy::cast_possible_truncation)]
    let skip = (start as i64 - 1).max(0) as usize;
    let chars = text.chars().skip(skip);
    #[expect(clippy::cast_possible_truncation)]
    let taken: String = match len {
        Some(len) => chars.take((len as i64).max(0) as usize).collect(),
        None => chars.collect(),
    };

    Value::Text(taken)
}

fn length(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("length", path, args, 1, 1, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(text) = text_arg("length", path, args, 0, ctx) else {
        return Value::Null;
    };

    Value::from(i64::try_from(text.chars().count()).unwrap_or(i64::MAX))
}

fn text_unary(
    name: &str,
    path: &str,
    args: &[Value],
    ctx: &mut QueryContext<'_>,
    f: impl Fn(&str) -> String,
) -> Value {
    if !check_arity(name, path, args, 1, 1, ctx) || any_null(args) {
        return Value::Null;
    }
    match text_arg(name, path, args, 0, ctx) {
        Some(text) => Value::Text(f(text)),
        None => Value::Null,
    }
}

fn replace(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("replace", path, args, 3, 3, ctx) || any_null(args) {
        return Value::Null;
    }
    let (Some(text), Some(from), Some(to)) = (
        text_arg("replace", path, args, 0, ctx),
        text_arg("replace", path, args, 1, ctx),
        text_arg("replace", path, args, 2, ctx),
    ) else {
        return Value::Null;
    };

    Value::Text(text.replace(from, to))
}

// ─────────────────────────────────────────────────────────────
// Numbers
// ─────────────────────────────────────────────────────────────

fn num_unary(
    name: &str,
    path: &str,
    args: &[Value],
    ctx: &mut QueryContext<'_>,
    f: impl Fn(f64) -> f64,
) -> Value {
    if !check_arity(name, path, args, 1, 1, ctx) || any_null(args) {
        return Value::Null;
    }
    match num_arg(name, path, args, 0, ctx) {
        Some(n) => Value::Number(f(n)),
        None => Value::Null,
    }
}

fn round(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("round", path, args, 1, 2, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(n) = num_arg("round", path, args, 0, ctx) else {
        return Value::Null;
    };
    let digits = if args.len() == 2 {
        match num_arg("round", path, args, 1, ctx) {
            Some(d) => d,
            None => return Value::Null,
        }
    } else {
        0.0
    };

    #[expect(clippy::cast_possible_truncation)]
    let factor = 10f64.powi(digits as i32);
    Value::Number((n * factor).round() / factor)
}

fn sqrt(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("sqrt", path, args, 1, 1, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(n) = num_arg("sqrt", path, args, 0, ctx) else {
        return Value::Null;
    };
    if n < 0.0 {
        ctx.record(ValidationError::new(
            path.to_string(),
            "Function 'sqrt' requires a non-negative argument",
        ));
        return Value::Null;
    }

    Value::Number(n.sqrt())
}

fn power(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("power", path, args, 2, 2, ctx) || any_null(args) {
        return Value::Null;
    }
    let (Some(base), Some(exponent)) = (
        num_arg("power", path, args, 0, ctx),
        num_arg("power", path, args, 1, ctx),
    ) else {
        return Value::Null;
    };

    Value::Number(base.powf(exponent))
}

// ─────────────────────────────────────────────────────────────
// Dates
// ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

fn date_part(token: &str, path: &str, ctx: &mut QueryContext<'_>) -> Option<DatePart> {
    match token.to_lowercase().as_str() {
        "year" => Some(DatePart::Year),
        "month" => Some(DatePart::Month),
        "day" => Some(DatePart::Day),
        "hour" => Some(DatePart::Hour),
        "minute" => Some(DatePart::Minute),
        "second" => Some(DatePart::Second),
        other => {
            ctx.record(ValidationError::new(
                path.to_string(),
                format!("Unknown date part '{other}'"),
            ));
            None
        }
    }
}

// A date argument is either a calendar date or a timestamp literal.
enum Temporal {
    Date(time::Date),
    DateTime(OffsetDateTime),
}

fn temporal_arg(
    name: &str,
    path: &str,
    args: &[Value],
    index: usize,
    ctx: &mut QueryContext<'_>,
) -> Option<Temporal> {
    let text = text_arg(name, path, args, index, ctx)?;
    if let Some(d) = date::parse_date(text) {
        return Some(Temporal::Date(d));
    }
    if let Some(dt) = date::parse_datetime(text) {
        return Some(Temporal::DateTime(dt));
    }

    ctx.record(
        ValidationError::new(
            format!("{path}.args[{index}]"),
            format!("Function '{name}' expects an ISO-8601 date or timestamp"),
        )
        .with_types(ValueKind::Date.to_string(), ValueKind::Text.to_string()),
    );
    None
}

fn now(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("now", path, args, 0, 0, ctx) {
        return Value::Null;
    }

    Value::from(ctx.now_ms)
}

fn current_date(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("current_date", path, args, 0, 0, ctx) {
        return Value::Null;
    }

    date::date_from_ms(ctx.now_ms).map_or(Value::Null, |d| Value::Text(date::format_date(d)))
}

// date_add(date, amount, part) / date_sub(date, amount, part)
fn date_shift(
    name: &str,
    path: &str,
    args: &[Value],
    ctx: &mut QueryContext<'_>,
    sign: i64,
) -> Value {
    if !check_arity(name, path, args, 3, 3, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(temporal) = temporal_arg(name, path, args, 0, ctx) else {
        return Value::Null;
    };
    let Some(amount) = num_arg(name, path, args, 1, ctx) else {
        return Value::Null;
    };
    let Some(part) = text_arg(name, path, args, 2, ctx) else {
        return Value::Null;
    };
    let Some(part) = date_part(part, &format!("{path}.args[2]"), ctx) else {
        return Value::Null;
    };

    #[expect(clippy::cast_possible_truncation)]
    let amount = (amount as i64) * sign;

    match temporal {
        Temporal::Date(d) => {
            let shifted = match part {
                DatePart::Year => date::add_months(d, amount * 12),
                DatePart::Month => date::add_months(d, amount),
                DatePart::Day => date::add_days(d, amount),
                // Sub-day parts promote the date to a midnight timestamp.
                DatePart::Hour | DatePart::Minute | DatePart::Second => {
                    let midnight = d.midnight().assume_utc();
                    return Value::Text(date::format_datetime(shift_datetime(
                        midnight, amount, part,
                    )));
                }
            };
            Value::Text(date::format_date(shifted))
        }
        Temporal::DateTime(dt) => {
            Value::Text(date::format_datetime(shift_datetime(dt, amount, part)))
        }
    }
}

fn shift_datetime(dt: OffsetDateTime, amount: i64, part: DatePart) -> OffsetDateTime {
    match part {
        DatePart::Year => dt.replace_date(date::add_months(dt.date(), amount * 12)),
        DatePart::Month => dt.replace_date(date::add_months(dt.date(), amount)),
        DatePart::Day => dt.checked_add(Duration::days(amount)).unwrap_or(dt),
        DatePart::Hour => dt.checked_add(Duration::hours(amount)).unwrap_or(dt),
        DatePart::Minute => dt.checked_add(Duration::minutes(amount)).unwrap_or(dt),
        DatePart::Second => dt.checked_add(Duration::seconds(amount)).unwrap_or(dt),
    }
}

// extract(part, date)
fn extract(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("extract", path, args, 2, 2, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(part) = text_arg("extract", path, args, 0, ctx) else {
        return Value::Null;
    };
    let Some(part) = date_part(part, &format!("{path}.args[0]"), ctx) else {
        return Value::Null;
    };
    let Some(temporal) = temporal_arg("extract", path, args, 1, ctx) else {
        return Value::Null;
    };

    let (d, t) = match temporal {
        Temporal::Date(d) => (d, Time::MIDNIGHT),
        Temporal::DateTime(dt) => (dt.date(), dt.time()),
    };
    let component: i64 = match part {
        DatePart::Year => i64::from(d.year()),
        DatePart::Month => i64::from(u8::from(d.month())),
        DatePart::Day => i64::from(d.day()),
        DatePart::Hour => i64::from(t.hour()),
        DatePart::Minute => i64::from(t.minute()),
        DatePart::Second => i64::from(t.second()),
    };

    Value::from(component)
}

// date_trunc(part, date)
fn date_trunc(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("date_trunc", path, args, 2, 2, ctx) || any_null(args) {
        return Value::Null;
    }
    let Some(part) = text_arg("date_trunc", path, args, 0, ctx) else {
        return Value::Null;
    };
    let Some(part) = date_part(part, &format!("{path}.args[0]"), ctx) else {
        return Value::Null;
    };
    let Some(temporal) = temporal_arg("date_trunc", path, args, 1, ctx) else {
        return Value::Null;
    };

    match temporal {
        Temporal::Date(d) => Value::Text(date::format_date(truncate_date(d, part))),
        Temporal::DateTime(dt) => {
            let date = truncate_date(dt.date(), part);
            let time = match part {
                DatePart::Year | DatePart::Month | DatePart::Day => Time::MIDNIGHT,
                DatePart::Hour => Time::from_hms(dt.hour(), 0, 0).unwrap_or(Time::MIDNIGHT),
                DatePart::Minute => {
                    Time::from_hms(dt.hour(), dt.minute(), 0).unwrap_or(Time::MIDNIGHT)
                }
                DatePart::Second => {
                    Time::from_hms(dt.hour(), dt.minute(), dt.second()).unwrap_or(Time::MIDNIGHT)
                }
            };
            Value::Text(date::format_datetime(
                dt.replace_date(date).replace_time(time),
            ))
        }
    }
}

fn truncate_date(d: time::Date, part: DatePart) -> time::Date {
    match part {
        DatePart::Year => time::Date::from_calendar_date(d.year(), Month::January, 1).unwrap_or(d),
        DatePart::Month => time::Date::from_calendar_date(d.year(), d.month(), 1).unwrap_or(d),
        _ => d,
    }
}

// ─────────────────────────────────────────────────────────────
// Logic
// ─────────────────────────────────────────────────────────────

fn coalesce(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("coalesce", path, args, 1, usize::MAX, ctx) {
        return Value::Null;
    }

    args.iter()
        .find(|arg| !arg.is_null())
        .cloned()
        .unwrap_or(Value::Null)
}

fn nullif(path: &str, args: &[Value], ctx: &mut QueryContext<'_>) -> Value {
    if !check_arity("nullif", path, args, 2, 2, ctx) {
        return Value::Null;
    }

    if args[0].compare(&args[1]) == std::cmp::Ordering::Equal {
        Value::Null
    } else {
        args[0].clone()
    }
}

fn extreme(
    name: &str,
    path: &str,
    args: &[Value],
    ctx: &mut QueryContext<'_>,
    greatest: bool,
) -> Value {
    if !check_arity(name, path, args, 1, usize::MAX, ctx) {
        return Value::Null;
    }

    let mut best: Option<&Value> = None;
    for arg in args {
        if arg.is_null() {
            continue;
        }
        let replace = best.is_none_or(|current| {
            let ordering = arg.compare(current);
            if greatest {
                ordering == std::cmp::Ordering::Greater
            } else {
                ordering == std::cmp::Ordering::Less
            }
        });
        if replace {
            best = Some(arg);
        }
    }

    best.cloned().unwrap_or(Value::Null)
}
