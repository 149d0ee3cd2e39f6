//! Instance validation.
//!
//! Validation checks an instance tree against its global element declaration and
//! annotates every element and attribute it recognizes with a [`SchemaInfo`], which
//! is what the merge engine and the reference scanner key off afterwards.

use crate::error::SchemaError;
use crate::model::ElementDecl;
use crate::set::{SchemaSet, TypeDef};
use bab_xml::{Element, SchemaInfo};
use std::collections::HashMap;

impl SchemaSet {
    /// Validates `element`, annotating it in place.
    ///
    /// Attributes in a namespace are reserved for the engine and never checked.
    pub fn validate_instance(&self, element: &mut Element) -> Result<(), SchemaError> {
        let mut errors = Vec::new();
        match self.global_element(&element.name) {
            Some(decl) => {
                let decl = decl.clone();
                let path = element.name.clone();
                self.validate_element(element, &decl, &path, &mut errors);
            }
            None => errors.push(format!("The '{}' element is not declared.", element.name)),
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Validation(errors))
        }
    }

    fn annotation(&self, type_name: &str, declared_ref: Option<&str>) -> SchemaInfo {
        SchemaInfo {
            type_name: type_name.to_string(),
            ref_type: declared_ref
                .or_else(|| self.ref_type_of(type_name))
                .map(str::to_string),
        }
    }

    fn validate_element(
        &self,
        element: &mut Element,
        decl: &ElementDecl,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        let Some(type_name) = decl.type_name.as_deref() else {
            // `xs:anyType`
            return;
        };
        element.schema = Some(self.annotation(type_name, decl.ref_type.as_deref()));
        match self.get_type(type_name) {
            Some(TypeDef::Complex(ty)) => {
                let simple_base = ty.simple_content.then(|| ty.base.clone()).flatten();
                self.validate_attributes(element, type_name, path, errors);
                self.validate_children(element, type_name, path, errors);
                if let Some(base) = simple_base {
                    if let Err(reason) = self.check_value(&base, element.text().trim()) {
                        errors.push(format!("{path}: {reason}"));
                    }
                }
            }
            Some(TypeDef::Simple(_)) | Some(TypeDef::Builtin(_)) => {
                if element.elements().next().is_some() {
                    errors.push(format!("{path}: element of simple type '{type_name}' has child elements."));
                }
                if let Err(reason) = self.check_value(type_name, element.text().trim()) {
                    errors.push(format!("{path}: {reason}"));
                }
            }
            None => errors.push(format!("{path}: type '{type_name}' is not declared.")),
        }
    }

    fn validate_attributes(
        &self,
        element: &mut Element,
        type_name: &str,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        for attr in element.attributes.iter_mut().filter(|a| a.namespace.is_none()) {
            let Some(decl) = self.find_attribute(type_name, &attr.name) else {
                errors.push(format!("{path}: the '{}' attribute is not declared.", attr.name));
                continue;
            };
            attr.schema = Some(self.annotation(&decl.type_name, decl.ref_type.as_deref()));
            if let Err(reason) = self.check_value(&decl.type_name, attr.value.trim()) {
                errors.push(format!("{path}/@{}: {reason}", attr.name));
            }
        }
        for decl in self.all_attributes(type_name) {
            if decl.required && element.attr(&decl.name).is_none() {
                errors.push(format!(
                    "{path}: the required attribute '{}' is missing.",
                    decl.name
                ));
            }
        }
    }

    fn validate_children(
        &self,
        element: &mut Element,
        type_name: &str,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for child in element.elements_mut() {
            let child_path = format!("{path}/{}", child.name);
            let Some(decl) = self.find_in_base(type_name, &child.name) else {
                errors.push(format!(
                    "{path}: the element '{type_name}' has invalid child element '{}'.",
                    child.name
                ));
                continue;
            };
            let seen = counts.entry(child.name.clone()).or_insert(0);
            *seen += 1;
            if *seen > decl.max_occurs {
                errors.push(format!(
                    "{path}: '{}' occurs more than {} time(s).",
                    child.name, decl.max_occurs
                ));
            }
            let decl = decl.clone();
            self.validate_element(child, &decl, &child_path, errors);
        }
        for name in self.type_chain(type_name) {
            let Some(particle) = self.complex_type(name).and_then(|c| c.particle.as_ref()) else {
                continue;
            };
            for item in particle.items.iter().filter(|i| i.in_sequence && i.min_occurs > 0) {
                if counts.get(&item.name).copied().unwrap_or(0) < item.min_occurs {
                    errors.push(format!("{path}: the child element '{}' is missing.", item.name));
                }
            }
        }
    }

    /// Checks a simple value against `type_name`.
    pub fn check_value(&self, type_name: &str, value: &str) -> Result<(), String> {
        for name in self.type_chain(type_name) {
            match self.get_type(name) {
                Some(TypeDef::Simple(simple)) => {
                    if let Some(item) = &simple.list_item {
                        return value
                            .split_whitespace()
                            .try_for_each(|token| self.check_value(item, token));
                    }
                    if !simple.enumerations.is_empty()
                        && !simple.enumerations.iter().any(|e| e == value)
                    {
                        return Err(format!("'{value}' is not a valid '{}' value.", simple.name));
                    }
                }
                Some(TypeDef::Builtin(builtin)) => return check_builtin(builtin, value),
                _ => {}
            }
        }
        Ok(())
    }
}

fn check_builtin(builtin: &str, value: &str) -> Result<(), String> {
    let ok = match builtin {
        "int" | "integer" | "long" | "short" | "byte" => value.parse::<i64>().is_ok(),
        "unsignedInt" | "unsignedLong" | "unsignedShort" | "unsignedByte" => {
            value.parse::<u64>().is_ok()
        }
        "float" | "double" | "decimal" => {
            value.parse::<f64>().is_ok() || matches!(value, "INF" | "-INF" | "NaN")
        }
        "boolean" => matches!(value, "true" | "false" | "1" | "0"),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid xs:{builtin}."))
    }
}

#[cfg(test)]
mod tests {
    use crate::set::tests::schema;
    use bab_xml::parse_document;

    #[test]
    fn annotates_valid_instance() {
        let s = schema();
        let mut el = parse_document(
            r#"<Unit id="u" xmlns:xai="uri:ea.com:eala:asset:instance" xai:joinAction="Replace">
                 <Weapon>Weapon:gun</Weapon><Escort>other</Escort></Unit>"#,
        )
        .unwrap();
        s.validate_instance(&mut el).unwrap();
        assert_eq!(el.schema_type(), Some("Unit"));
        let weapon = el.child("Weapon").unwrap();
        assert_eq!(weapon.schema_type(), Some("WeaponRef"));
        assert_eq!(weapon.schema.as_ref().unwrap().ref_type.as_deref(), Some("Weapon"));
        let escort = el.child("Escort").unwrap();
        assert_eq!(escort.schema.as_ref().unwrap().ref_type.as_deref(), Some("Unit"));
        let id = el.attributes.iter().find(|a| a.name == "id").unwrap();
        assert_eq!(id.schema.as_ref().unwrap().type_name, "xs:string");
    }

    #[test]
    fn reports_every_problem() {
        let s = schema();
        let mut el = parse_document(
            r#"<Weapon bogus="1" flags="FAST MEDIUM"><Damage>lots</Damage><Nope/></Weapon>"#,
        )
        .unwrap();
        let err = s.validate_instance(&mut el).unwrap_err();
        let crate::SchemaError::Validation(messages) = err else {
            panic!("expected validation error");
        };
        assert_eq!(messages.len(), 5, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("'bogus'")));
        assert!(messages.iter().any(|m| m.contains("MEDIUM")));
        assert!(messages.iter().any(|m| m.contains("xs:int")));
        assert!(messages.iter().any(|m| m.contains("'Nope'")));
        assert!(messages.iter().any(|m| m.contains("'id'")));
    }

    #[test]
    fn undeclared_root() {
        let s = schema();
        let mut el = parse_document("<Tank id='t'/>").unwrap();
        assert!(s.validate_instance(&mut el).is_err());
    }

    #[test]
    fn max_occurs_is_enforced() {
        let s = schema();
        let mut el = parse_document("<Rifle id='r'><Scope>a</Scope><Scope>b</Scope></Rifle>").unwrap();
        assert!(s.validate_instance(&mut el).is_err());
        let mut el = parse_document("<Rifle id='r'><Tag>a</Tag><Tag>b</Tag></Rifle>").unwrap();
        assert!(s.validate_instance(&mut el).is_ok());
    }

    #[test]
    fn list_values() {
        let s = schema();
        assert!(s.check_value("FlagSet", "FAST SLOW").is_ok());
        assert!(s.check_value("FlagSet", "").is_ok());
        assert!(s.check_value("FlagSet", "FAST NOPE").is_err());
        assert!(s.check_value("xs:boolean", "yes").is_err());
        assert!(s.check_value("xs:float", "1.5").is_ok());
    }
}
