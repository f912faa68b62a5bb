use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::RuleContext;
use crate::ledger::Ledger;

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "timespan",
        description: "A kml:TimeSpan has a begin or an end, and begin precedes end",
        check: timespan,
    },
    Rule {
        id: "timestamp-when",
        description: "A kml:TimeStamp has a kml:when",
        check: timestamp_when,
    },
];

/// Parse a KML time value into the instant it starts at.
///
/// Accepts xsd:dateTime (with or without a zone offset, zoneless values
/// taken as UTC), xsd:date, xsd:gYearMonth and xsd:gYear.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    let date = match text.split('-').collect::<Vec<_>>().as_slice() {
        [_, _, _] => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        [year, month] if year.len() == 4 && month.len() == 2 => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
        [year] if year.len() == 4 => NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1),
        _ => None,
    }?;
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn timespan(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:TimeSpan[not(ancestor::kml:Update)]",
        ledger,
        |span, ledger| {
            let begin = span.child_text(KmlTag::Begin);
            let end = span.child_text(KmlTag::End);
            let (begin, end) = match (begin, end) {
                (None, None) => {
                    ledger.error(span, "kml:TimeSpan has neither kml:begin nor kml:end");
                    return Ok(());
                }
                (Some(begin), Some(end)) => (begin, end),
                _ => return Ok(()),
            };

            let parsed_begin = parse_time(begin);
            let parsed_end = parse_time(end);
            if parsed_begin.is_none() {
                ledger.error(span, format!("kml:begin '{}' is not a valid time", begin));
            }
            if parsed_end.is_none() {
                ledger.error(span, format!("kml:end '{}' is not a valid time", end));
            }
            if let (Some(b), Some(e)) = (parsed_begin, parsed_end) {
                if b >= e {
                    ledger.error(
                        span,
                        format!("kml:begin '{}' is not earlier than kml:end '{}'", begin, end),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn timestamp_when(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:TimeStamp[not(ancestor::kml:Update)]",
        ledger,
        |stamp, ledger| {
            if !stamp.has_child(KmlTag::When) {
                ledger.error(stamp, "kml:TimeStamp has no kml:when");
            }
            Ok(())
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{kml, messages, run};
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_forms() {
        let midnight = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        assert_eq!(parse_time("1997"), Some(midnight(1997, 1, 1)));
        assert_eq!(parse_time("1997-07"), Some(midnight(1997, 7, 1)));
        assert_eq!(parse_time("1997-07-16"), Some(midnight(1997, 7, 16)));
        assert_eq!(
            parse_time("1997-07-16T07:30:15Z"),
            Some(Utc.with_ymd_and_hms(1997, 7, 16, 7, 30, 15).unwrap())
        );
        assert_eq!(
            parse_time("1997-07-16T10:30:15+03:00"),
            Some(Utc.with_ymd_and_hms(1997, 7, 16, 7, 30, 15).unwrap())
        );
        assert_eq!(
            parse_time("1997-07-16T07:30:15"),
            Some(Utc.with_ymd_and_hms(1997, 7, 16, 7, 30, 15).unwrap())
        );
        assert_eq!(parse_time("1997-13"), None);
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_timespan() {
        let text = kml(
            "<Document>\
             <Placemark><TimeSpan><begin>2000</begin><end>2001-01</end></TimeSpan></Placemark>\
             <Placemark><TimeSpan><begin>2000-06-01</begin></TimeSpan></Placemark>\
             <Placemark><TimeSpan/></Placemark>\
             <Placemark><TimeSpan><begin>2001</begin><end>2000</end></TimeSpan></Placemark>\
             <Placemark><TimeSpan><begin>soon</begin><end>2000</end></TimeSpan></Placemark>\
             </Document>",
        );
        assert_eq!(
            messages(&run(timespan, &text)),
            vec![
                "kml:TimeSpan has neither kml:begin nor kml:end",
                "kml:begin '2001' is not earlier than kml:end '2000'",
                "kml:begin 'soon' is not a valid time",
            ]
        );
    }

    #[test]
    fn test_timestamp_when() {
        let text = kml("<Document><Placemark><TimeStamp/></Placemark><Placemark><TimeStamp><when>2000</when></TimeStamp></Placemark></Document>");
        assert_eq!(run(timestamp_when, &text).len(), 1);
    }
}
