//! Reading XSD files into schema declarations.

use crate::error::SchemaError;
use crate::model::{
    AttributeDecl, ComplexType, Derivation, ElementDecl, Particle, ParticleKind, SimpleType,
    UNBOUNDED,
};
use bab_xml::{parse_document, xml_hash, Element, SCHEMA_NS};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const BUILTINS: &[&str] = &[
    "string", "boolean", "int", "integer", "long", "short", "byte", "unsignedInt",
    "unsignedLong", "unsignedShort", "unsignedByte", "float", "double", "decimal",
    "anyURI", "NMTOKEN", "NMTOKENS", "token", "ID", "IDREF",
];

/// Everything declared across a schema file and its includes.
#[derive(Debug, Default)]
pub struct Declarations {
    /// Named and synthesized complex types.
    pub complex: BTreeMap<String, ComplexType>,
    /// Named and synthesized simple types.
    pub simple: BTreeMap<String, SimpleType>,
    /// Global element declarations.
    pub elements: BTreeMap<String, ElementDecl>,
    /// Every file read, with its modification time at read time.
    pub files: Vec<(PathBuf, Option<SystemTime>)>,
    visited: BTreeSet<PathBuf>,
}

/// Per-file parsing context: the prefix this file binds to the XSD namespace.
struct FileContext<'a> {
    path: &'a Path,
    xs_prefix: Option<String>,
}

impl FileContext<'_> {
    fn qualify(&self, raw: &str) -> String {
        match raw.split_once(':') {
            Some((prefix, local)) if Some(prefix) == self.xs_prefix.as_deref() => {
                format!("xs:{local}")
            }
            Some((_, local)) => local.to_string(),
            None if self.xs_prefix.is_none() && BUILTINS.contains(&raw) => format!("xs:{raw}"),
            None => raw.to_string(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::Invalid {
            path: self.path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

fn occurs(raw: Option<&str>, default: u32) -> u32 {
    match raw {
        Some("unbounded") => UNBOUNDED,
        Some(v) => v.trim().parse().unwrap_or(default),
        None => default,
    }
}

fn ref_type(el: &Element) -> Option<String> {
    el.attr_ns(SCHEMA_NS, "refType").map(str::to_string)
}

impl Declarations {
    /// Reads `path` and every schema it includes.
    pub fn read_file(&mut self, path: &Path) -> Result<(), SchemaError> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.insert(path.clone()) {
            return Ok(());
        }
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        self.files.push((path.clone(), modified));
        let root = bab_xml::parse_file(&path).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(schema = %path.display(), "reading schema");
        self.read_root(&path, &root)
    }

    /// Reads schema text that has no includes.
    pub fn read_str(&mut self, text: &str) -> Result<(), SchemaError> {
        let path = PathBuf::from("<memory>");
        let root = parse_document(text).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;
        self.read_root(&path, &root)
    }

    fn read_root(&mut self, path: &Path, root: &Element) -> Result<(), SchemaError> {
        let ctx = FileContext {
            path,
            xs_prefix: root.prefix.clone(),
        };
        if root.name != "schema" {
            return Err(ctx.invalid(format!("root element is <{}>", root.qualified_name())));
        }
        for child in root.elements() {
            match child.name.as_str() {
                "include" | "import" => {
                    let Some(location) = child.attr("schemaLocation") else {
                        continue;
                    };
                    let dir = path.parent().unwrap_or_else(|| Path::new("."));
                    self.read_file(&dir.join(location))?;
                }
                "complexType" => {
                    let name = child
                        .attr("name")
                        .ok_or_else(|| ctx.invalid("global complexType without a name"))?;
                    self.complex_type(&ctx, child, name.to_string())?;
                }
                "simpleType" => {
                    let name = child
                        .attr("name")
                        .ok_or_else(|| ctx.invalid("global simpleType without a name"))?;
                    self.simple_type(&ctx, child, name.to_string())?;
                }
                "element" => {
                    let decl = self.element_decl(&ctx, child, "", false)?;
                    self.elements.insert(decl.name.clone(), decl);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn complex_type(
        &mut self,
        ctx: &FileContext<'_>,
        el: &Element,
        name: String,
    ) -> Result<(), SchemaError> {
        let mut ty = ComplexType {
            name: name.clone(),
            base: None,
            derivation: None,
            particle: None,
            attributes: Vec::new(),
            simple_content: false,
            ref_type: ref_type(el),
            fingerprint: xml_hash(0, el),
        };
        for child in el.elements() {
            match child.name.as_str() {
                "sequence" | "choice" | "all" => {
                    ty.particle = Some(self.particle(ctx, child, &name)?);
                }
                "attribute" => ty.attributes.push(self.attribute_decl(ctx, child, &name)?),
                "complexContent" | "simpleContent" => {
                    ty.simple_content = child.name == "simpleContent";
                    let Some(derive) = child.elements().next() else {
                        continue;
                    };
                    ty.derivation = match derive.name.as_str() {
                        "extension" => Some(Derivation::Extension),
                        "restriction" => Some(Derivation::Restriction),
                        other => return Err(ctx.invalid(format!("unsupported <{other}> in {name}"))),
                    };
                    ty.base = derive.attr("base").map(|b| ctx.qualify(b));
                    for part in derive.elements() {
                        match part.name.as_str() {
                            "sequence" | "choice" | "all" => {
                                ty.particle = Some(self.particle(ctx, part, &name)?);
                            }
                            "attribute" => {
                                ty.attributes.push(self.attribute_decl(ctx, part, &name)?)
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        self.complex.insert(name, ty);
        Ok(())
    }

    fn particle(
        &mut self,
        ctx: &FileContext<'_>,
        el: &Element,
        owner: &str,
    ) -> Result<Particle, SchemaError> {
        let kind = match el.name.as_str() {
            "choice" => ParticleKind::Choice,
            "all" => ParticleKind::All,
            _ => ParticleKind::Sequence,
        };
        let mut particle = Particle {
            kind,
            max_occurs: occurs(el.attr("maxOccurs"), 1),
            items: Vec::new(),
        };
        for child in el.elements() {
            match child.name.as_str() {
                "element" => {
                    let decl =
                        self.element_decl(ctx, child, owner, kind == ParticleKind::Sequence)?;
                    particle.items.push(decl);
                }
                "sequence" | "choice" | "all" => {
                    let nested = self.particle(ctx, child, owner)?;
                    particle.items.extend(nested.items);
                }
                _ => {}
            }
        }
        Ok(particle)
    }

    fn element_decl(
        &mut self,
        ctx: &FileContext<'_>,
        el: &Element,
        owner: &str,
        in_sequence: bool,
    ) -> Result<ElementDecl, SchemaError> {
        let name = match (el.attr("name"), el.attr("ref")) {
            (Some(n), _) => n.to_string(),
            (None, Some(r)) => ctx.qualify(r),
            (None, None) => return Err(ctx.invalid(format!("element without a name in {owner}"))),
        };
        let mut type_name = el.attr("type").map(|t| ctx.qualify(t));
        for inline in el.elements() {
            let anon = format!("{owner}.{name}");
            match inline.name.as_str() {
                "complexType" => {
                    self.complex_type(ctx, inline, anon.clone())?;
                    type_name = Some(anon);
                }
                "simpleType" => {
                    self.simple_type(ctx, inline, anon.clone())?;
                    type_name = Some(anon);
                }
                _ => {}
            }
        }
        Ok(ElementDecl {
            name,
            type_name,
            min_occurs: occurs(el.attr("minOccurs"), 1),
            max_occurs: occurs(el.attr("maxOccurs"), 1),
            ref_type: ref_type(el),
            in_sequence,
        })
    }

    fn attribute_decl(
        &mut self,
        ctx: &FileContext<'_>,
        el: &Element,
        owner: &str,
    ) -> Result<AttributeDecl, SchemaError> {
        let name = el
            .attr("name")
            .ok_or_else(|| ctx.invalid(format!("attribute without a name in {owner}")))?
            .to_string();
        let mut type_name = el
            .attr("type")
            .map(|t| ctx.qualify(t))
            .unwrap_or_else(|| "xs:string".to_string());
        if let Some(inline) = el.child("simpleType") {
            let anon = format!("{owner}@{name}");
            self.simple_type(ctx, inline, anon.clone())?;
            type_name = anon;
        }
        Ok(AttributeDecl {
            name,
            type_name,
            required: el.attr("use") == Some("required"),
            ref_type: ref_type(el),
        })
    }

    fn simple_type(
        &mut self,
        ctx: &FileContext<'_>,
        el: &Element,
        name: String,
    ) -> Result<(), SchemaError> {
        let mut ty = SimpleType {
            name: name.clone(),
            base: None,
            enumerations: Vec::new(),
            other_facets: false,
            list_item: None,
            ref_type: ref_type(el),
        };
        for child in el.elements() {
            match child.name.as_str() {
                "restriction" => {
                    ty.base = child.attr("base").map(|b| ctx.qualify(b));
                    for facet in child.elements() {
                        match facet.name.as_str() {
                            "enumeration" => {
                                if let Some(v) = facet.attr("value") {
                                    ty.enumerations.push(v.to_string());
                                }
                            }
                            "simpleType" => {
                                let anon = format!("{name}.base");
                                self.simple_type(ctx, facet, anon.clone())?;
                                ty.base = Some(anon);
                            }
                            "annotation" => {}
                            _ => ty.other_facets = true,
                        }
                    }
                }
                "list" => {
                    ty.list_item = child.attr("itemType").map(|t| ctx.qualify(t));
                    if let Some(inline) = child.child("simpleType") {
                        let anon = format!("{name}.item");
                        self.simple_type(ctx, inline, anon.clone())?;
                        ty.list_item = Some(anon);
                    }
                }
                "union" => ty.base = Some("xs:string".to_string()),
                _ => {}
            }
        }
        self.simple.insert(name, ty);
        Ok(())
    }
}
