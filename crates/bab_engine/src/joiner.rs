//! Schema-driven merging of an override instance onto its inheritance source.
//!
//! Each node of the override may carry `joinAction` (`Append`, `Replace`, `Remove`)
//! and `insertPosition` (`Top`, `Bottom`) in the instance namespace. Children are
//! matched against the destination by `id` when the schema lets them repeat, by
//! position in a single-valued choice, and by name otherwise. Flag-set attributes
//! written as `+FLAG -FLAG` are merged token by token against the inherited value.

use bab_common::{BuildError, BuildResult, ErrorCode};
use bab_schema::{ParticleKind, SchemaSet};
use bab_xml::{Attribute, Element, Node, INSTANCE_NS};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JoinAction {
    Append,
    Overwrite,
    Remove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InsertPosition {
    Top,
    Bottom,
}

fn join_action(node: &Element) -> BuildResult<Option<JoinAction>> {
    let Some(value) = node.attr_ns(INSTANCE_NS, "joinAction") else {
        return Ok(None);
    };
    match value.trim() {
        "Append" => Ok(Some(JoinAction::Append)),
        "Replace" | "Overwrite" => Ok(Some(JoinAction::Overwrite)),
        "Remove" => Ok(Some(JoinAction::Remove)),
        other => Err(BuildError::new(
            ErrorCode::SchemaValidation,
            format!(
                "{other} not valid for joinAction, in {}.  Valid values: Append, Replace, Remove",
                node.name
            ),
        )),
    }
}

fn insert_position(node: &Element) -> BuildResult<InsertPosition> {
    match node.attr_ns(INSTANCE_NS, "insertPosition").map(str::trim) {
        None | Some("Bottom") => Ok(InsertPosition::Bottom),
        Some("Top") => Ok(InsertPosition::Top),
        Some(other) => Err(BuildError::new(
            ErrorCode::SchemaValidation,
            format!(
                "{other} not valid for insertPosition, in {}.  Valid values: Top, Bottom",
                node.name
            ),
        )),
    }
}

/// Identifies the instance being merged, for messages.
struct Root<'a> {
    type_name: &'a str,
    id: &'a str,
}

/// Merges override subtrees onto base subtrees.
pub struct NodeJoiner<'a> {
    schema: &'a SchemaSet,
    document: &'a Path,
}

impl<'a> NodeJoiner<'a> {
    /// A joiner for instances declared in `document`.
    pub fn new(schema: &'a SchemaSet, document: &'a Path) -> Self {
        Self { schema, document }
    }

    /// Returns a new tree: `base` with `overlay` applied on top.
    pub fn override_instance(&self, base: &Element, overlay: &Element) -> BuildResult<Element> {
        let root = Root {
            type_name: &overlay.name,
            id: overlay.attr("id").unwrap_or_default(),
        };
        let action = join_action(overlay)?.unwrap_or(JoinAction::Append);
        if action == JoinAction::Remove {
            return Err(BuildError::new(
                ErrorCode::InheritFromError,
                format!(
                    "Removal of top-level asset is not supported, in {}:{} ({})",
                    root.type_name,
                    root.id,
                    self.document.display()
                ),
            ));
        }
        let mut result = overlay.shallow_copy();
        result.schema = overlay.schema.clone().or_else(|| base.schema.clone());
        self.apply(&mut result, base, JoinAction::Append, &root)?;
        self.apply(&mut result, overlay, action, &root)?;
        Ok(result)
    }

    fn apply(&self, dest: &mut Element, src: &Element, action: JoinAction, root: &Root<'_>) -> BuildResult<()> {
        self.apply_attributes(dest, src)?;
        if src.has_text() {
            let text = src.text();
            if !text.trim().is_empty() {
                dest.set_text(text);
            }
        }

        let parent_type = dest
            .schema_type()
            .or_else(|| src.schema_type())
            .map(str::to_string);
        let model = parent_type
            .as_deref()
            .and_then(|t| self.schema.content_model(t));
        let kind = model.map(|m| m.kind);

        for child in src.elements() {
            let decl = parent_type
                .as_deref()
                .and_then(|t| self.schema.find_in_base(t, &child.name));
            if kind == Some(ParticleKind::Sequence) && decl.is_none() {
                return Err(BuildError::new(
                    ErrorCode::XmlFormattingError,
                    format!("Bad XML: unexpected {} in {}", child.name, dest.name),
                ));
            }
            let replace_any = matches!(model, Some(m) if m.kind == ParticleKind::Choice && m.max_occurs <= 1);
            let id_match = match model {
                Some(m) if m.kind == ParticleKind::Sequence => decl.is_some_and(|d| d.max_occurs > 1),
                Some(m) if m.kind == ParticleKind::Choice => m.max_occurs > 1,
                _ => false,
            };
            let child_action = join_action(child)?.unwrap_or(action);
            let position = insert_position(child)?;

            let found = find_match(dest, child, replace_any, id_match);
            let mut insert_at = None;
            if let Some(index) = found {
                let same_name = matches!(&dest.children[index], Node::Element(e) if e.name == child.name);
                if same_name && child_action == JoinAction::Append {
                    if let Node::Element(target) = &mut dest.children[index] {
                        self.apply(target, child, child_action, root)?;
                    }
                    continue;
                }
                dest.children.remove(index);
                insert_at = Some(index);
            }
            if child_action == JoinAction::Remove {
                if found.is_none() {
                    return Err(BuildError::new(
                        ErrorCode::InheritFromError,
                        format!(
                            "{}:{} in {}:{} attempts to remove non-existent node",
                            child.name,
                            child.attr("id").unwrap_or_default(),
                            root.type_name,
                            root.id
                        ),
                    ));
                }
                continue;
            }

            let mut fresh = child.shallow_copy();
            fresh.schema = child.schema.clone();
            self.apply(&mut fresh, child, child_action, root)?;
            let at = match insert_at {
                Some(at) => at,
                None => self.insert_index(dest, &child.name, parent_type.as_deref(), kind, position),
            };
            dest.children.insert(at, Node::Element(fresh));
        }
        Ok(())
    }

    fn apply_attributes(&self, dest: &mut Element, src: &Element) -> BuildResult<()> {
        for attr in &src.attributes {
            if attr.namespace.as_deref() == Some(INSTANCE_NS) {
                continue;
            }
            let existing = dest
                .attributes
                .iter()
                .position(|a| a.namespace == attr.namespace && a.name == attr.name);
            let is_flag_set = attr
                .schema
                .as_ref()
                .is_some_and(|s| self.schema.is_enum_list(&s.type_name));
            let value = if is_flag_set && has_modifiers(&attr.value) {
                let current = existing.map_or("", |i| dest.attributes[i].value.as_str());
                self.merge_flags(current, attr, &dest.name)?
            } else {
                attr.value.clone()
            };
            match existing {
                Some(i) => {
                    let target = &mut dest.attributes[i];
                    target.value = value;
                    if attr.schema.is_some() {
                        target.schema = attr.schema.clone();
                    }
                }
                None => dest.attributes.push(Attribute {
                    value,
                    ..attr.clone()
                }),
            }
        }
        Ok(())
    }

    fn merge_flags(&self, current: &str, attr: &Attribute, node: &str) -> BuildResult<String> {
        let mut tokens: Vec<String> = current.split_whitespace().map(str::to_string).collect();
        for modifier in attr.value.split_whitespace() {
            if let Some(flag) = modifier.strip_prefix('+') {
                if !tokens.iter().any(|t| t == flag) {
                    tokens.push(flag.to_string());
                }
            } else if let Some(flag) = modifier.strip_prefix('-') {
                let Some(pos) = tokens.iter().position(|t| t == flag) else {
                    return Err(BuildError::new(
                        ErrorCode::InheritFromError,
                        format!(
                            "Invalid removal of bitflag {flag} from attribute {} in node {node} in document {}",
                            attr.name,
                            self.document.display()
                        ),
                    ));
                };
                tokens.remove(pos);
            } else {
                return Err(BuildError::new(
                    ErrorCode::InheritFromError,
                    format!(
                        "Illegal form for +/- override of attribute {} in node {node} in document {}: '{modifier}'",
                        attr.name,
                        self.document.display()
                    ),
                ));
            }
        }
        Ok(tokens.join(" "))
    }

    /// Where a new child named `name` goes in `dest`.
    fn insert_index(
        &self,
        dest: &Element,
        name: &str,
        parent_type: Option<&str>,
        kind: Option<ParticleKind>,
        position: InsertPosition,
    ) -> usize {
        let children = dest.children.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Element(e) => Some((i, e)),
            _ => None,
        });
        if position == InsertPosition::Top {
            if let Some((i, _)) = children.clone().find(|(_, e)| e.name == name) {
                return i;
            }
        }
        match (kind, parent_type) {
            (Some(ParticleKind::Sequence), Some(ty)) => children
                .filter(|(_, e)| e.name == name || self.schema.find_prev_node(ty, &e.name, name))
                .last()
                .map_or(0, |(i, _)| i + 1),
            _ => children
                .filter(|(_, e)| e.name == name)
                .last()
                .map_or(dest.children.len(), |(i, _)| i + 1),
        }
    }
}

fn has_modifiers(value: &str) -> bool {
    value
        .split_whitespace()
        .any(|t| t.starts_with('+') || t.starts_with('-'))
}

fn find_match(dest: &Element, child: &Element, replace_any: bool, id_match: bool) -> Option<usize> {
    let mut elements = dest.children.iter().enumerate().filter_map(|(i, n)| match n {
        Node::Element(e) => Some((i, e)),
        _ => None,
    });
    if id_match {
        let id = child.attr("id")?;
        return elements
            .find(|(_, e)| e.name == child.name && e.attr("id") == Some(id))
            .map(|(i, _)| i);
    }
    if replace_any {
        let all: Vec<(usize, &Element)> = elements.collect();
        if all.len() == 1 {
            return Some(all[0].0);
        }
        return all.iter().find(|(_, e)| e.name == child.name).map(|(i, _)| *i);
    }
    elements.find(|(_, e)| e.name == child.name).map(|(i, _)| i)
}
