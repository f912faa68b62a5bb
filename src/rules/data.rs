use std::collections::{HashMap, HashSet};

use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::{RuleContext, parse_decimal};
use crate::ledger::Ledger;
use crate::resolver::Expectation;

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "schema-id",
        description: "A kml:Schema has an id",
        check: schema_id,
    },
    Rule {
        id: "simple-field",
        description: "A kml:SimpleField has a name and a supported type",
        check: simple_field,
    },
    Rule {
        id: "schema-data",
        description: "kml:SchemaData refers to a kml:Schema and its values match the declared types",
        check: schema_data,
    },
    Rule {
        id: "data-name-unique",
        description: "kml:Data names are unique within their kml:ExtendedData",
        check: data_name_unique,
    },
];

/// Strip a namespace prefix such as `xsd:` from a type name
fn local_type(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Whether `value` is in the lexical space of the XSD simple type `type_name`
fn conforms(type_name: &str, value: &str) -> bool {
    let value = value.trim();
    match type_name {
        "int" => value.parse::<i32>().is_ok(),
        "unsignedInt" => value.parse::<u32>().is_ok(),
        "short" => value.parse::<i16>().is_ok(),
        "unsignedShort" => value.parse::<u16>().is_ok(),
        "float" | "double" => parse_decimal(value).is_some(),
        "boolean" => matches!(value, "true" | "false" | "1" | "0"),
        _ => true,
    }
}

fn schema_id(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Schema", ledger, |schema, ledger| {
        if schema.attribute("id").is_none_or(|id| id.trim().is_empty()) {
            ledger.error(schema, "kml:Schema has no id");
        }
        Ok(())
    })?;
    Ok(())
}

fn simple_field(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:SimpleField", ledger, |field, ledger| {
        if field.attribute("name").is_none_or(str::is_empty) {
            ledger.error(field, "kml:SimpleField has no name");
        }
        match field.attribute("type") {
            None => ledger.error(field, "kml:SimpleField has no type"),
            Some(t) if !ctx.catalog.is_simple_type(local_type(t)) => {
                ledger.error(field, format!("kml:SimpleField type '{}' is not supported", t))
            }
            Some(_) => {}
        }
        Ok(())
    })?;
    Ok(())
}

fn schema_data(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:SchemaData[not(ancestor::kml:Update)]",
        ledger,
        |data, ledger| {
            let Some(schema_url) = data.attribute("schemaUrl") else {
                ledger.error(data, "kml:SchemaData has no schemaUrl");
                return Ok(());
            };
            let reference = ctx.resolver.resolve(
                ctx.document,
                schema_url,
                &Expectation::element_of(&[KmlTag::Schema]),
            );
            reference.record_failures(ledger, data);
            if !reference.is_ok() {
                return Ok(());
            }
            let Some(schema) = reference.target(ctx.document) else {
                return Ok(());
            };

            let fields: HashMap<&str, &str> = schema
                .children_of(KmlTag::SimpleField)
                .filter_map(|f| Some((f.attribute("name")?, local_type(f.attribute("type")?))))
                .collect();

            for simple in data.children_of(KmlTag::SimpleData) {
                let name = simple.attribute("name").unwrap_or("");
                match fields.get(name) {
                    None => ledger.error(
                        simple,
                        format!("kml:SimpleData '{}' is not declared in '{}'", name, schema_url),
                    ),
                    Some(type_name) if !conforms(type_name, simple.text()) => ledger.error(
                        simple,
                        format!(
                            "kml:SimpleData '{}' value '{}' is not a valid {}",
                            name,
                            simple.text(),
                            type_name
                        ),
                    ),
                    Some(_) => {}
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn data_name_unique(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:ExtendedData", ledger, |extended, ledger| {
        let mut seen = HashSet::new();
        for data in extended.children_of(KmlTag::Data) {
            let Some(name) = data.attribute("name") else {
                continue;
            };
            if !seen.insert(name) {
                ledger.error(extended, format!("kml:Data name '{}' is not unique", name));
            }
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{kml, messages, run};

    const SCHEMA: &str = r#"<Schema id="trail" name="Trail">
        <SimpleField name="length" type="xsd:int"/>
        <SimpleField name="paved" type="boolean"/>
        <SimpleField name="grade" type="double"/>
        <SimpleField name="label" type="string"/>
      </Schema>"#;

    #[test]
    fn test_conforms() {
        assert!(conforms("int", "-12"));
        assert!(!conforms("int", "3000000000"));
        assert!(conforms("unsignedInt", "3000000000"));
        assert!(!conforms("unsignedShort", "-1"));
        assert!(conforms("short", "-32768"));
        assert!(!conforms("boolean", "yes"));
        assert!(conforms("double", "1e-3"));
        assert!(conforms("string", "anything"));
    }

    #[test]
    fn test_schema_and_fields() {
        let text = kml(
            r#"<Document><Schema><SimpleField name="a" type="xsd:date"/><SimpleField type="int"/></Schema></Document>"#,
        );
        assert_eq!(messages(&run(schema_id, &text)), vec!["kml:Schema has no id"]);
        assert_eq!(
            messages(&run(simple_field, &text)),
            vec![
                "kml:SimpleField type 'xsd:date' is not supported",
                "kml:SimpleField has no name"
            ]
        );
    }

    #[test]
    fn test_schema_data_values() {
        let text = kml(&format!(
            r##"<Document>{}<Placemark><ExtendedData><SchemaData schemaUrl="#trail">
                 <SimpleData name="length">12</SimpleData>
                 <SimpleData name="paved">maybe</SimpleData>
                 <SimpleData name="grade">0.5</SimpleData>
                 <SimpleData name="width">3</SimpleData>
               </SchemaData></ExtendedData></Placemark></Document>"##,
            SCHEMA
        ));
        let found = messages(&run(schema_data, &text));
        assert_eq!(
            found,
            vec![
                "kml:SimpleData 'paved' value 'maybe' is not a valid boolean",
                "kml:SimpleData 'width' is not declared in '#trail'",
            ]
        );
    }

    #[test]
    fn test_schema_data_reference_failures() {
        let text = kml(
            r##"<Document><Placemark id="p"><ExtendedData>
                 <SchemaData schemaUrl="#p"/><SchemaData/>
               </ExtendedData></Placemark></Document>"##,
        );
        let found = messages(&run(schema_data, &text));
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("expected kml:Schema"));
        assert_eq!(found[1], "kml:SchemaData has no schemaUrl");
    }

    #[test]
    fn test_data_names_unique() {
        let text = kml(
            r#"<Placemark><ExtendedData><Data name="a"/><Data name="b"/><Data name="a"/></ExtendedData></Placemark>"#,
        );
        assert_eq!(messages(&run(data_name_unique, &text)), vec!["kml:Data name 'a' is not unique"]);
    }
}
