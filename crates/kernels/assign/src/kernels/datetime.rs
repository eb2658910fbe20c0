//! Date, time and datetime conversion kernels.
//!
//! Storage:
//!
//! - `date`: `i32` days since 1970-01-01
//! - `time`: `i64` 100ns ticks since midnight
//! - `datetime`: `i64` 100ns ticks since the Unix epoch
//!
//! Each has an NA sentinel (see [`continuum_ndt::na`]). The literal text
//! `NA` parses to it and it formats as `NA`.
//!
//! # Date parsing
//!
//! Accepted forms are ISO `2014-03-17`, compact `20140317`, month names in
//! any position (`Mar 17, 2014`, `17 March 2014`) and three numbers separated
//! by `-`, `/`, `.` or spaces. For three numbers whose first is not a
//! four-digit year, the context's [`DateParseOrder`] decides; `noambig`
//! accepts the input only when the day can be told from the month.
//! Two-digit years are expanded with the context's century window.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use continuum_ndt::{ErrorMode, TICKS_PER_DAY, TICKS_PER_SECOND, Timezone, Type, TypeId, na};

use super::copy::append_copy;
use super::string::Text;
use crate::builder::{KernelBuilder, Node};
use crate::config::DateParseOrder;
use crate::engine::{AssignEngine, AssignRequest};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, unary};
use crate::table::DispatchTable;

/// Days from 0001-01-01 (day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Which temporal storage a kernel reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date,
    Time(Timezone),
    DateTime(Timezone),
}

impl Temporal {
    pub fn of(tp: &Type) -> Option<Temporal> {
        match tp.id() {
            TypeId::Date => Some(Temporal::Date),
            TypeId::Time => Some(Temporal::Time(tp.timezone().unwrap_or_default())),
            TypeId::DateTime => Some(Temporal::DateTime(tp.timezone().unwrap_or_default())),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Temporal::Date => "date",
            Temporal::Time(Timezone::Naive) => "time",
            Temporal::Time(Timezone::Utc) => "time[tz='UTC']",
            Temporal::DateTime(Timezone::Naive) => "datetime",
            Temporal::DateTime(Timezone::Utc) => "datetime[tz='UTC']",
        }
    }
}

/// Parsing policy copied from the evaluation context at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParsing {
    pub order: DateParseOrder,
    pub century_window: i32,
}

// ============================================================================
// Calendar Helpers
// ============================================================================

pub fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_CE_DAYS
}

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_CE_DAYS)?)
}

fn ticks_from_time(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * TICKS_PER_SECOND
        + (time.nanosecond() % 1_000_000_000) as i64 / 100
}

fn time_from_ticks(ticks: i64) -> Option<NaiveTime> {
    if !(0..TICKS_PER_DAY).contains(&ticks) {
        return None;
    }
    let secs = (ticks / TICKS_PER_SECOND) as u32;
    let nanos = (ticks % TICKS_PER_SECOND) as u32 * 100;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Num(&'a str),
    Word(&'a str),
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            if piece.bytes().all(|b| b.is_ascii_digit()) {
                Token::Num(piece)
            } else {
                Token::Word(piece)
            }
        })
        .collect()
}

fn month_from_name(word: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    if word.len() < 3 {
        return None;
    }
    let word = word.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| month.starts_with(&word))
        .map(|i| i as u32 + 1)
}

fn number(digits: &str) -> std::result::Result<u32, &'static str> {
    digits.parse().map_err(|_| "number out of range")
}

fn year(digits: &str, window: i32) -> std::result::Result<i32, &'static str> {
    let value = digits.parse::<i32>().map_err(|_| "year out of range")?;
    if digits.len() > 2 {
        return Ok(value);
    }
    if window <= 0 {
        return Err("two-digit years are not accepted");
    }
    Ok(if value < window { 2000 + value } else { 1900 + value })
}

/// Parse a calendar date.
pub fn parse_date(text: &str, policy: DateParsing) -> std::result::Result<NaiveDate, &'static str> {
    use Token::{Num, Word};

    let window = policy.century_window;
    let (y, m, d) = match tokenize(text).as_slice() {
        [Num(s)] if s.len() == 8 => (year(&s[..4], window)?, number(&s[4..6])?, number(&s[6..])?),
        [Num(y), Word(m), Num(d)] if y.len() > 2 => {
            (year(y, window)?, month_from_name(m).ok_or("unknown month")?, number(d)?)
        }
        [Num(d), Word(m), Num(y)] | [Word(m), Num(d), Num(y)] => {
            (year(y, window)?, month_from_name(m).ok_or("unknown month")?, number(d)?)
        }
        [Num(a), Num(b), Num(c)] if a.len() > 2 => (year(a, window)?, number(b)?, number(c)?),
        [Num(a), Num(b), Num(c)] => {
            let (a_n, b_n) = (number(a)?, number(b)?);
            match policy.order {
                DateParseOrder::Ymd => (year(a, window)?, b_n, number(c)?),
                DateParseOrder::Mdy => (year(c, window)?, a_n, b_n),
                DateParseOrder::Dmy => (year(c, window)?, b_n, a_n),
                DateParseOrder::NoAmbig => {
                    if a_n == b_n || b_n > 12 {
                        (year(c, window)?, a_n, b_n)
                    } else if a_n > 12 {
                        (year(c, window)?, b_n, a_n)
                    } else {
                        return Err("ambiguous date; set a date parse order");
                    }
                }
            }
        }
        _ => return Err("unrecognized date format"),
    };
    NaiveDate::from_ymd_opt(y, m, d).ok_or("day or month out of range")
}

/// Parse a time of day.
pub fn parse_time(text: &str) -> std::result::Result<NaiveTime, &'static str> {
    const FORMATS: [&str; 4] = ["%H:%M:%S%.f", "%H:%M", "%I:%M:%S%.f %p", "%I:%M %p"];
    FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .ok_or("unrecognized time format")
}

/// Split a trailing `Z` or `±hh:mm` / `±hhmm` zone from a time.
///
/// Returns the remaining text and the zone's offset east of UTC in seconds.
fn split_zone(text: &str) -> std::result::Result<(&str, Option<i64>), &'static str> {
    if let Some(rest) = text.strip_suffix(['Z', 'z']) {
        return Ok((rest.trim_end(), Some(0)));
    }
    let Some(pos) = text.rfind(['+', '-']) else {
        return Ok((text, None));
    };
    let sign = if text[pos..].starts_with('-') { -1 } else { 1 };
    let digits: String = text[pos + 1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("malformed timezone offset");
    }
    let hours: i64 = digits[..2].parse().map_err(|_| "malformed timezone offset")?;
    let minutes: i64 = digits[2..].parse().map_err(|_| "malformed timezone offset")?;
    Ok((text[..pos].trim_end(), Some(sign * (hours * 3600 + minutes * 60))))
}

/// Position of the `T` separating date and time, if any.
fn iso_separator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (1..bytes.len().saturating_sub(1))
        .find(|&i| {
            matches!(bytes[i], b'T' | b't')
                && bytes[i - 1].is_ascii_digit()
                && bytes[i + 1].is_ascii_digit()
        })
}

fn apply_zone(
    ticks: i64,
    zone: Option<i64>,
    tz: Timezone,
) -> std::result::Result<i64, &'static str> {
    match (zone, tz) {
        (None, _) => Ok(ticks),
        (Some(_), Timezone::Naive) => Err("timezone given for a type without one"),
        (Some(offset), Timezone::Utc) => ticks
            .checked_sub(offset * TICKS_PER_SECOND)
            .ok_or("value out of range"),
    }
}

fn parse_time_ticks(text: &str, tz: Timezone) -> std::result::Result<i64, &'static str> {
    let (time, zone) = split_zone(text)?;
    let ticks = ticks_from_time(parse_time(time)?);
    apply_zone(ticks, zone, tz).map(|t| t.rem_euclid(TICKS_PER_DAY))
}

fn parse_datetime_ticks(
    text: &str,
    tz: Timezone,
    policy: DateParsing,
) -> std::result::Result<i64, &'static str> {
    let split = iso_separator(text).or_else(|| {
        let colon = text.find(':')?;
        text[..colon].rfind(' ')
    });
    let (date, time) = match split {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    };
    let days = days_from_date(parse_date(date.trim(), policy)?) as i64;
    let (time_ticks, zone) = match time {
        Some(time) => {
            let (time, zone) = split_zone(time.trim())?;
            (ticks_from_time(parse_time(time)?), zone)
        }
        None => (0, None),
    };
    let ticks = days
        .checked_mul(TICKS_PER_DAY)
        .and_then(|t| t.checked_add(time_ticks))
        .ok_or("value out of range")?;
    apply_zone(ticks, zone, tz)
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S%.f").to_string()
}

fn zone_suffix(tz: Timezone) -> &'static str {
    match tz {
        Timezone::Naive => "",
        Timezone::Utc => "Z",
    }
}

fn format_ticks(ticks: i64, tz: Timezone) -> Option<String> {
    let days = i32::try_from(ticks.div_euclid(TICKS_PER_DAY)).ok()?;
    let date = date_from_days(days)?;
    let time = time_from_ticks(ticks.rem_euclid(TICKS_PER_DAY))?;
    Some(format!("{}T{}{}", date.format("%Y-%m-%d"), format_time(time), zone_suffix(tz)))
}

// ============================================================================
// Kernels
// ============================================================================

/// Parses text into a date, time or datetime.
#[derive(Debug, Clone, Copy)]
pub struct TextToTemporal {
    pub text: Text,
    pub unit: Temporal,
    pub parsing: DateParsing,
}

impl Kernel for TextToTemporal {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let bytes = unsafe { self.text.read(src) };
        let reject = |reason: &str| Error::parse(self.unit.name(), bytes, reason);
        let text = std::str::from_utf8(bytes)
            .map_err(|_| reject("invalid UTF-8"))?
            .trim();
        let missing = text == "NA";
        match self.unit {
            Temporal::Date => {
                let days = if missing {
                    na::DATE
                } else {
                    days_from_date(parse_date(text, self.parsing).map_err(reject)?)
                };
                unsafe { dst.cast::<i32>().write_unaligned(days) };
            }
            Temporal::Time(tz) => {
                let ticks = if missing {
                    na::TICKS
                } else {
                    parse_time_ticks(text, tz).map_err(reject)?
                };
                unsafe { dst.cast::<i64>().write_unaligned(ticks) };
            }
            Temporal::DateTime(tz) => {
                let ticks = if missing {
                    na::TICKS
                } else {
                    parse_datetime_ticks(text, tz, self.parsing).map_err(reject)?
                };
                unsafe { dst.cast::<i64>().write_unaligned(ticks) };
            }
        }
        Ok(())
    }
}

/// Formats a date, time or datetime as text.
#[derive(Debug, Clone, Copy)]
pub struct TemporalToText {
    pub text: Text,
    pub unit: Temporal,
    pub mode: ErrorMode,
}

impl TemporalToText {
    fn out_of_range(&self, value: impl ToString) -> Error {
        Error::Overflow {
            src_tp: self.unit.name().to_string(),
            value: value.to_string(),
            dst_tp: "string".to_string(),
        }
    }
}

impl Kernel for TemporalToText {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let formatted = match self.unit {
            Temporal::Date => {
                let days = unsafe { src.cast::<i32>().read_unaligned() };
                if days == na::DATE {
                    "NA".to_string()
                } else {
                    let date = date_from_days(days).ok_or_else(|| self.out_of_range(days))?;
                    date.format("%Y-%m-%d").to_string()
                }
            }
            Temporal::Time(tz) => {
                let ticks = unsafe { src.cast::<i64>().read_unaligned() };
                if ticks == na::TICKS {
                    "NA".to_string()
                } else {
                    let time = time_from_ticks(ticks).ok_or_else(|| self.out_of_range(ticks))?;
                    format!("{}{}", format_time(time), zone_suffix(tz))
                }
            }
            Temporal::DateTime(tz) => {
                let ticks = unsafe { src.cast::<i64>().read_unaligned() };
                if ticks == na::TICKS {
                    "NA".to_string()
                } else {
                    format_ticks(ticks, tz).ok_or_else(|| self.out_of_range(ticks))?
                }
            }
        };
        unsafe { self.text.write(dst, formatted.as_bytes(), self.mode) }
    }
}

/// Widens a date to midnight of that day.
///
/// Dates too far from the epoch for 100ns ticks are an overflow when checked
/// and saturate otherwise.
#[derive(Debug, Clone, Copy)]
pub struct DateToDateTime {
    pub mode: ErrorMode,
}

impl Kernel for DateToDateTime {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let days = unsafe { src.cast::<i32>().read_unaligned() };
        let ticks = if days == na::DATE {
            na::TICKS
        } else {
            match i64::from(days).checked_mul(TICKS_PER_DAY) {
                Some(ticks) if ticks != na::TICKS => ticks,
                _ if self.mode.checks_overflow() => {
                    return Err(Error::Overflow {
                        src_tp: "date".to_string(),
                        value: days.to_string(),
                        dst_tp: "datetime".to_string(),
                    });
                }
                // never lands on the NA sentinel
                _ => i64::from(days).saturating_mul(TICKS_PER_DAY).max(na::TICKS + 1),
            }
        };
        unsafe { dst.cast::<i64>().write_unaligned(ticks) };
        Ok(())
    }
}

/// Truncates a datetime to its date.
///
/// A nonzero time of day is a fractional loss under `fractional` and
/// `inexact`. Every non-NA tick count lies within about 10.7 million days of
/// the epoch, so the result never reaches the NA sentinel; out-of-range days
/// are still checked and saturate one short of it.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeToDate {
    pub tz: Timezone,
    pub mode: ErrorMode,
}

impl Kernel for DateTimeToDate {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let ticks = unsafe { src.cast::<i64>().read_unaligned() };
        let days = if ticks == na::TICKS {
            na::DATE
        } else {
            let days = ticks.div_euclid(TICKS_PER_DAY);
            let describe = || format_ticks(ticks, self.tz).unwrap_or_else(|| ticks.to_string());
            if self.mode.checks_fractional() && ticks.rem_euclid(TICKS_PER_DAY) != 0 {
                return Err(Error::Fractional {
                    src_tp: Temporal::DateTime(self.tz).name().to_string(),
                    value: describe(),
                    dst_tp: "date".to_string(),
                });
            }
            match i32::try_from(days) {
                Ok(days) if days != na::DATE => days,
                _ if self.mode.checks_overflow() => {
                    return Err(Error::Overflow {
                        src_tp: Temporal::DateTime(self.tz).name().to_string(),
                        value: describe(),
                        dst_tp: "date".to_string(),
                    });
                }
                _ => days.clamp(i64::from(na::DATE) + 1, i64::from(i32::MAX)) as i32,
            }
        };
        unsafe { dst.cast::<i32>().write_unaligned(days) };
        Ok(())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn temporal_of(tp: &Type) -> Result<Temporal> {
    Temporal::of(tp).ok_or_else(|| Error::mismatch(tp, "date/time"))
}

fn text_of(tp: &Type) -> Result<Text> {
    Text::of(tp).ok_or_else(|| Error::mismatch(tp, "string"))
}

fn text_to_temporal(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let ctx = engine.context();
    let kernel = TextToTemporal {
        text: text_of(req.src.tp)?,
        unit: temporal_of(req.dst.tp)?,
        parsing: DateParsing {
            order: ctx.date_parse_order,
            century_window: ctx.century_window,
        },
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

fn temporal_to_text(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = TemporalToText {
        text: text_of(req.dst.tp)?,
        unit: temporal_of(req.src.tp)?,
        mode: req.mode,
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

fn date_to_datetime(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    builder.append(DateToDateTime { mode: req.mode }, req.request)?;
    Ok(())
}

fn datetime_to_date(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = DateTimeToDate {
        tz: req.src.tp.timezone().unwrap_or_default(),
        mode: req.mode,
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

/// Ticks are the same instant whatever the attached timezone.
fn retag_ticks(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    append_copy(builder, 8, req.request)
}

pub(crate) fn register(table: &mut DispatchTable) {
    let all = &ErrorMode::CONCRETE;
    for text in [TypeId::String, TypeId::FixedString] {
        for unit in [TypeId::Date, TypeId::Time, TypeId::DateTime] {
            table.register_exact(unit, text, all, text_to_temporal);
            table.register_exact(text, unit, all, temporal_to_text);
        }
    }
    table.register_exact(TypeId::DateTime, TypeId::Date, all, date_to_datetime);
    table.register_exact(TypeId::Date, TypeId::DateTime, all, datetime_to_date);
    table.register_exact(TypeId::Time, TypeId::Time, all, retag_ticks);
    table.register_exact(TypeId::DateTime, TypeId::DateTime, all, retag_ticks);
}

#[cfg(test)]
mod tests {
    use continuum_ndt::StringData;

    use super::*;
    use crate::builder::KernelRequest;
    use crate::config::EvalContext;
    use crate::engine::AssignKernel;

    const NOAMBIG: DateParsing = DateParsing {
        order: DateParseOrder::NoAmbig,
        century_window: 70,
    };

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn from_text(kernel: &AssignKernel, text: &str) -> Result<i64> {
        let src = StringData::from(text);
        let mut out = [0u8; 8];
        unsafe { kernel.single(out.as_mut_ptr(), (&src as *const StringData).cast())? };
        Ok(match kernel.dst_type().id() {
            TypeId::Date => i32::from_ne_bytes(out[..4].try_into().unwrap()) as i64,
            _ => i64::from_ne_bytes(out),
        })
    }

    fn to_text(kernel: &AssignKernel, raw: &[u8]) -> Result<String> {
        let mut out = StringData::new();
        unsafe { kernel.single((&mut out as *mut StringData).cast(), raw.as_ptr())? };
        Ok(out.as_str().unwrap_or_default().to_string())
    }

    fn build(engine: &AssignEngine, dst: Type, src: Type, mode: ErrorMode) -> AssignKernel {
        engine.build(&dst, &src, mode, KernelRequest::Single).unwrap()
    }

    #[test]
    fn test_epoch_days() {
        assert_eq!(days_from_date(ymd(1970, 1, 1)), 0);
        assert_eq!(days_from_date(ymd(1969, 12, 31)), -1);
        assert_eq!(date_from_days(16_146), Some(ymd(2014, 3, 17)));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("2014-03-17", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("20140317", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("Mar 17, 2014", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("17 march 2014", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("2014 Mar 17", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("2014-02-30", NOAMBIG), Err("day or month out of range"));
        assert!(parse_date("yesterday", NOAMBIG).is_err());
    }

    #[test]
    fn test_ambiguity_and_order() {
        assert_eq!(parse_date("03/17/2014", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("17/03/2014", NOAMBIG), Ok(ymd(2014, 3, 17)));
        assert_eq!(parse_date("05/05/2014", NOAMBIG), Ok(ymd(2014, 5, 5)));
        assert!(parse_date("03/04/2014", NOAMBIG).is_err());

        let dmy = DateParsing {
            order: DateParseOrder::Dmy,
            ..NOAMBIG
        };
        assert_eq!(parse_date("03/04/2014", dmy), Ok(ymd(2014, 4, 3)));
        let mdy = DateParsing {
            order: DateParseOrder::Mdy,
            ..NOAMBIG
        };
        assert_eq!(parse_date("03/04/2014", mdy), Ok(ymd(2014, 3, 4)));
        let ymd_order = DateParsing {
            order: DateParseOrder::Ymd,
            ..NOAMBIG
        };
        assert_eq!(parse_date("14-03-04", ymd_order), Ok(ymd(2014, 3, 4)));
    }

    #[test]
    fn test_century_window() {
        assert_eq!(parse_date("03/17/69", NOAMBIG), Ok(ymd(2069, 3, 17)));
        assert_eq!(parse_date("03/17/70", NOAMBIG), Ok(ymd(1970, 3, 17)));
        let strict = DateParsing {
            century_window: 0,
            ..NOAMBIG
        };
        assert!(parse_date("03/17/70", strict).is_err());
    }

    #[test]
    fn test_time_parsing() {
        assert_eq!(parse_time_ticks("00:00:01.5", Timezone::Naive), Ok(15_000_000));
        let half_past_one = 13 * 3600 * TICKS_PER_SECOND + 30 * 60 * TICKS_PER_SECOND;
        assert_eq!(parse_time_ticks("1:30 PM", Timezone::Naive), Ok(half_past_one));
        assert_eq!(parse_time_ticks("01:00Z", Timezone::Utc), Ok(3600 * TICKS_PER_SECOND));
        assert_eq!(parse_time_ticks("01:00+01:00", Timezone::Utc), Ok(0));
        assert!(parse_time_ticks("01:00Z", Timezone::Naive).is_err());
    }

    #[test]
    fn test_string_date_round_trip_with_na() {
        let engine = AssignEngine::default();
        let parse = build(&engine, Type::date(), Type::string(), ErrorMode::Fractional);
        assert_eq!(from_text(&parse, "2014-03-17").unwrap(), 16_146);
        assert_eq!(from_text(&parse, "NA").unwrap(), na::DATE as i64);
        assert!(matches!(from_text(&parse, "bogus"), Err(Error::Parse { .. })));

        let format = build(&engine, Type::string(), Type::date(), ErrorMode::Fractional);
        assert_eq!(to_text(&format, &16_146i32.to_ne_bytes()).unwrap(), "2014-03-17");
        assert_eq!(to_text(&format, &na::DATE.to_ne_bytes()).unwrap(), "NA");
    }

    #[test]
    fn test_context_parse_order_reaches_kernel() {
        let engine = AssignEngine::new(EvalContext {
            date_parse_order: DateParseOrder::Dmy,
            ..EvalContext::default()
        });
        let parse = build(&engine, Type::date(), Type::string(), ErrorMode::Fractional);
        let days = from_text(&parse, "01/02/1970").unwrap();
        assert_eq!(days, 31);
    }

    #[test]
    fn test_datetime_text() {
        let engine = AssignEngine::default();
        let utc = Type::datetime(Timezone::Utc);
        let parse = build(&engine, utc.clone(), Type::string(), ErrorMode::Fractional);
        let one_day = TICKS_PER_DAY;
        assert_eq!(from_text(&parse, "1970-01-02T00:00:00Z").unwrap(), one_day);
        assert_eq!(from_text(&parse, "1970-01-02 01:00+01:00").unwrap(), one_day);
        assert_eq!(from_text(&parse, "Jan 2, 1970").unwrap(), one_day);

        let naive_tp = Type::datetime(Timezone::Naive);
        let naive = build(&engine, naive_tp, Type::string(), ErrorMode::Fractional);
        assert!(from_text(&naive, "1970-01-02T00:00:00Z").is_err());

        let format = build(&engine, Type::string(), utc, ErrorMode::Fractional);
        let ticks = one_day + 15_000_000;
        assert_eq!(to_text(&format, &ticks.to_ne_bytes()).unwrap(), "1970-01-02T00:00:01.500Z");
        assert_eq!(to_text(&format, &na::TICKS.to_ne_bytes()).unwrap(), "NA");
    }

    #[test]
    fn test_date_datetime_conversions() {
        let engine = AssignEngine::default();
        let naive = Type::datetime(Timezone::Naive);
        let widen = build(&engine, naive.clone(), Type::date(), ErrorMode::Inexact);
        let mut ticks = 0i64;
        unsafe {
            widen.single((&mut ticks as *mut i64).cast(), (&2i32 as *const i32).cast()).unwrap()
        };
        assert_eq!(ticks, 2 * TICKS_PER_DAY);

        let narrow = build(&engine, Type::date(), naive.clone(), ErrorMode::Fractional);
        let mut days = 0i32;
        let noon = 2 * TICKS_PER_DAY + TICKS_PER_DAY / 2;
        let err = unsafe {
            narrow.single((&mut days as *mut i32).cast(), (&noon as *const i64).cast())
        }.unwrap_err();
        assert!(matches!(err, Error::Fractional { .. }));

        let lossy = build(&engine, Type::date(), naive, ErrorMode::Overflow);
        unsafe {
            lossy.single((&mut days as *mut i32).cast(), (&noon as *const i64).cast()).unwrap()
        };
        assert_eq!(days, 2);
        unsafe {
            lossy.single((&mut days as *mut i32).cast(), (&na::TICKS as *const i64).cast()).unwrap()
        };
        assert_eq!(days, na::DATE);
    }

    #[test]
    fn test_far_dates_overflow_ticks() {
        let engine = AssignEngine::default();
        let naive = Type::datetime(Timezone::Naive);
        let far = 20_000_000i32;
        let mut ticks = 0i64;

        for mode in [ErrorMode::Overflow, ErrorMode::Fractional, ErrorMode::Inexact] {
            let widen = build(&engine, naive.clone(), Type::date(), mode);
            let err = unsafe {
                widen.single((&mut ticks as *mut i64).cast(), (&far as *const i32).cast())
            };
            assert!(matches!(err, Err(Error::Overflow { .. })), "{mode}");
        }

        let widen = build(&engine, naive.clone(), Type::date(), ErrorMode::NoCheck);
        unsafe {
            widen.single((&mut ticks as *mut i64).cast(), (&far as *const i32).cast()).unwrap()
        };
        assert_eq!(ticks, i64::MAX);
        let early = -20_000_000i32;
        unsafe {
            widen.single((&mut ticks as *mut i64).cast(), (&early as *const i32).cast()).unwrap()
        };
        assert_eq!(ticks, na::TICKS + 1);
        let edge = -10_000_000i32;
        unsafe {
            widen.single((&mut ticks as *mut i64).cast(), (&edge as *const i32).cast()).unwrap()
        };
        assert_eq!(ticks, i64::from(edge) * TICKS_PER_DAY);
    }

    #[test]
    fn test_extreme_datetimes_never_become_na_dates() {
        let engine = AssignEngine::default();
        let naive = Type::datetime(Timezone::Naive);
        let mut days = 0i32;

        for mode in ErrorMode::CONCRETE {
            let narrow = build(&engine, Type::date(), naive.clone(), mode);
            // the earliest and latest representable midnights
            let (first, last) = (na::TICKS / TICKS_PER_DAY, i64::MAX / TICKS_PER_DAY);
            for ticks in [first * TICKS_PER_DAY, last * TICKS_PER_DAY] {
                let expected = ticks.div_euclid(TICKS_PER_DAY) as i32;
                let days_ptr = (&mut days as *mut i32).cast();
                unsafe { narrow.single(days_ptr, (&ticks as *const i64).cast()).unwrap() };
                assert_eq!(days, expected, "{mode}");
                assert_ne!(days, na::DATE, "{mode}");
            }
        }
    }
}
