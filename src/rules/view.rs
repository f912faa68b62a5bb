use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::{DEFAULT_ALTITUDE_MODE, RuleContext, altitude_mode, child_number};
use crate::ledger::Ledger;

use super::Rule;

pub const RULES: &[Rule] = &[Rule {
    id: "lookat-content",
    description: "A kml:LookAt has a position, a range and a tilt within [0, 90]",
    check: lookat_content,
}];

fn lookat_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LookAt[not(ancestor::kml:Update)]",
        ledger,
        |look_at, ledger| {
            if !ctx.test(look_at, "kml:longitude and kml:latitude and kml:range")? {
                ledger.error(
                    look_at,
                    "kml:LookAt requires kml:longitude, kml:latitude and kml:range",
                );
            }
            if altitude_mode(look_at) != DEFAULT_ALTITUDE_MODE && !look_at.has_child(KmlTag::Altitude)
            {
                ledger.error(
                    look_at,
                    format!(
                        "kml:LookAt with altitudeMode {} has no kml:altitude",
                        altitude_mode(look_at)
                    ),
                );
            }
            if let Some(tilt) = child_number(look_at, KmlTag::Tilt)?
                .filter(|t| !(0.0..=90.0).contains(t))
            {
                ledger.error(look_at, format!("kml:tilt {} is outside [0, 90]", tilt));
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

    #[test]
    fn test_complete_look_at_passes() {
        let text = kml(
            "<Placemark><LookAt><longitude>1</longitude><latitude>2</latitude><range>100</range>\
             <tilt>45</tilt></LookAt></Placemark>",
        );
        assert!(run(lookat_content, &text).is_empty());
    }

    #[test]
    fn test_look_at_violations() {
        let text = kml(
            "<Placemark><LookAt><longitude>1</longitude><tilt>95</tilt>\
             <altitudeMode>absolute</altitudeMode></LookAt></Placemark>",
        );
        assert_eq!(
            messages(&run(lookat_content, &text)),
            vec![
                "kml:LookAt requires kml:longitude, kml:latitude and kml:range",
                "kml:LookAt with altitudeMode absolute has no kml:altitude",
                "kml:tilt 95 is outside [0, 90]",
            ]
        );
    }
}
