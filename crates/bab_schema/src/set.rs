//! The compiled schema and the queries the build engine runs against it.

use crate::error::SchemaError;
use crate::loader::Declarations;
use crate::model::{
    AttributeDecl, ComplexType, Derivation, ElementDecl, ParticleKind, SimpleType,
};
use crate::{ASSET_REFERENCE, BASE_ASSET_TYPE};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A resolved type.
#[derive(Clone, Copy, Debug)]
pub enum TypeDef<'a> {
    /// A declared complex type.
    Complex(&'a ComplexType),
    /// A declared simple type.
    Simple(&'a SimpleType),
    /// An `xs:` built-in, by local name.
    Builtin(&'a str),
}

/// The effective content model of a complex type, inherited parts included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentModel {
    /// Outermost compositor.
    pub kind: ParticleKind,
    /// The compositor's `maxOccurs`.
    pub max_occurs: u32,
}

/// A loaded asset schema.
#[derive(Debug)]
pub struct SchemaSet {
    source: Option<PathBuf>,
    files: Vec<(PathBuf, Option<SystemTime>)>,
    complex: BTreeMap<String, ComplexType>,
    simple: BTreeMap<String, SimpleType>,
    elements: BTreeMap<String, ElementDecl>,
    derived: BTreeMap<String, Vec<String>>,
    asset_dependencies: BTreeMap<String, usize>,
}

impl SchemaSet {
    /// Loads the schema at `path` and everything it includes.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let mut decls = Declarations::default();
        decls.read_file(path)?;
        let mut set = Self::compile(decls)?;
        set.source = Some(path.to_path_buf());
        Ok(set)
    }

    /// Builds a schema from in-memory XSD text without includes.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let mut decls = Declarations::default();
        decls.read_str(text)?;
        Self::compile(decls)
    }

    fn compile(decls: Declarations) -> Result<Self, SchemaError> {
        let mut set = Self {
            source: None,
            files: decls.files,
            complex: decls.complex,
            simple: decls.simple,
            elements: decls.elements,
            derived: BTreeMap::new(),
            asset_dependencies: BTreeMap::new(),
        };
        set.resolve_element_refs();
        if !set.complex.contains_key(BASE_ASSET_TYPE) {
            return Err(SchemaError::MissingType(BASE_ASSET_TYPE.to_string()));
        }
        set.build_inheritance_map();
        set.build_asset_dependencies();
        Ok(set)
    }

    /// Local declarations written as `ref="X"` take the global element's type.
    fn resolve_element_refs(&mut self) {
        let globals = self.elements.clone();
        for ty in self.complex.values_mut() {
            if let Some(particle) = &mut ty.particle {
                for item in &mut particle.items {
                    if item.type_name.is_none() {
                        if let Some(global) = globals.get(&item.name) {
                            item.type_name = global.type_name.clone();
                            if item.ref_type.is_none() {
                                item.ref_type = global.ref_type.clone();
                            }
                        }
                    }
                }
            }
        }
    }

    fn build_inheritance_map(&mut self) {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.asset_types() {
            if let Some(base) = self.base_of(name) {
                children
                    .entry(base.to_string())
                    .or_default()
                    .push(name.to_string());
            }
        }
        fn flatten(name: &str, children: &BTreeMap<String, Vec<String>>, out: &mut Vec<String>) {
            if let Some(direct) = children.get(name) {
                for child in direct {
                    out.push(child.clone());
                    flatten(child, children, out);
                }
            }
        }
        for name in children.keys() {
            let mut all = Vec::new();
            flatten(name, &children, &mut all);
            self.derived.insert(name.clone(), all);
        }
    }

    fn build_asset_dependencies(&mut self) {
        let asset_types: Vec<String> = self.asset_types().map(str::to_string).collect();
        let mut direct: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in &asset_types {
            let mut refs = BTreeSet::new();
            let mut visited = BTreeSet::new();
            self.collect_references(name, &mut refs, &mut visited);
            direct.insert(name.clone(), refs);
        }
        for name in &asset_types {
            let mut closure = BTreeSet::new();
            let mut stack: Vec<&String> = direct[name].iter().collect();
            while let Some(next) = stack.pop() {
                if closure.insert(next.clone()) {
                    if let Some(more) = direct.get(next) {
                        stack.extend(more.iter());
                    }
                }
            }
            self.asset_dependencies.insert(name.clone(), closure.len());
        }
    }

    /// Collects the asset types `type_name` can reference through its content.
    fn collect_references(
        &self,
        type_name: &str,
        refs: &mut BTreeSet<String>,
        visited: &mut BTreeSet<String>,
    ) {
        if !visited.insert(type_name.to_string()) {
            return;
        }
        if let Some(base) = self.base_of(type_name) {
            let base = base.to_string();
            self.collect_references(&base, refs, visited);
        }
        let Some(ty) = self.complex.get(type_name) else {
            return;
        };
        for attr in &ty.attributes {
            self.count_reference(&attr.type_name, attr.ref_type.as_deref(), refs, visited);
        }
        if let Some(particle) = &ty.particle {
            for item in &particle.items {
                if let Some(item_type) = &item.type_name {
                    self.count_reference(item_type, item.ref_type.as_deref(), refs, visited);
                }
            }
        }
    }

    fn count_reference(
        &self,
        type_name: &str,
        declared: Option<&str>,
        refs: &mut BTreeSet<String>,
        visited: &mut BTreeSet<String>,
    ) {
        if self.is_derived_from(type_name, ASSET_REFERENCE) {
            if let Some(target) = declared.or_else(|| self.ref_type_of(type_name)) {
                refs.insert(target.to_string());
            }
        } else {
            self.collect_references(type_name, refs, visited);
        }
    }

    /// Whether any schema file changed on disk since it was read.
    pub fn is_stale(&self) -> bool {
        self.files.iter().any(|(path, modified)| {
            let now = std::fs::metadata(path).and_then(|m| m.modified()).ok();
            now != *modified
        })
    }

    /// Reloads the schema if any of its files changed. Returns whether it reloaded.
    pub fn reload_if_changed(&mut self) -> Result<bool, SchemaError> {
        let Some(source) = self.source.clone() else {
            return Ok(false);
        };
        if !self.is_stale() {
            return Ok(false);
        }
        tracing::info!(schema = %source.display(), "schema changed, reloading");
        *self = Self::load(&source)?;
        Ok(true)
    }

    /// Names of every complex type derived from (or equal to) `BaseAssetType`.
    pub fn asset_types(&self) -> impl Iterator<Item = &str> {
        self.complex
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_derived_from(name, BASE_ASSET_TYPE))
    }

    /// Looks up a type by name.
    pub fn get_type<'a>(&'a self, name: &'a str) -> Option<TypeDef<'a>> {
        if let Some(local) = name.strip_prefix("xs:") {
            return Some(TypeDef::Builtin(local));
        }
        self.complex
            .get(name)
            .map(TypeDef::Complex)
            .or_else(|| self.simple.get(name).map(TypeDef::Simple))
    }

    /// Looks up a complex type by name.
    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.complex.get(name)
    }

    /// Looks up a simple type by name.
    pub fn simple_type(&self, name: &str) -> Option<&SimpleType> {
        self.simple.get(name)
    }

    /// Looks up a global element declaration.
    pub fn global_element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    /// The direct base type of `name`, if it has one.
    pub fn base_of<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        match self.get_type(name)? {
            TypeDef::Complex(c) => c.base.as_deref(),
            TypeDef::Simple(s) => s.base.as_deref(),
            TypeDef::Builtin(_) => None,
        }
    }

    /// `name` followed by each of its ancestors.
    pub fn type_chain<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![name];
        let mut current = name;
        while let Some(base) = self.base_of(current) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Whether `name` is `base` or derives from it.
    pub fn is_derived_from(&self, name: &str, base: &str) -> bool {
        self.type_chain(name).contains(&base)
    }

    /// Every asset type transitively derived from `name`, excluding `name` itself.
    pub fn derived_types(&self, name: &str) -> Option<&[String]> {
        self.derived.get(name).map(Vec::as_slice)
    }

    /// How many asset types `name` can transitively reference.
    pub fn asset_dependency_count(&self, name: &str) -> usize {
        self.asset_dependencies.get(name).copied().unwrap_or(0)
    }

    /// Declaration hash of a complex type, `0` if unknown.
    pub fn fingerprint(&self, name: &str) -> u32 {
        self.complex.get(name).map_or(0, |c| c.fingerprint)
    }

    /// The `refType` a reference type carries, inherited through extension.
    pub fn ref_type_of<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        let mut current = name;
        for _ in 0..64 {
            let (own, base, extends) = match self.get_type(current)? {
                TypeDef::Complex(c) => (
                    c.ref_type.as_deref(),
                    c.base.as_deref(),
                    c.derivation == Some(Derivation::Extension),
                ),
                TypeDef::Simple(s) => (s.ref_type.as_deref(), s.base.as_deref(), true),
                TypeDef::Builtin(_) => return None,
            };
            if own.is_some() {
                return own;
            }
            match base {
                Some(b) if extends => current = b,
                _ => return None,
            }
        }
        None
    }

    /// Finds the declaration of child element `child` in `type_name` or its bases.
    ///
    /// Bases are searched first.
    pub fn find_in_base(&self, type_name: &str, child: &str) -> Option<&ElementDecl> {
        let chain = self.type_chain(type_name);
        chain.iter().rev().find_map(|name| {
            self.complex
                .get(*name)
                .and_then(|c| c.particle.as_ref())
                .and_then(|p| p.items.iter().find(|item| item.name == child))
        })
    }

    /// Finds attribute `attr` declared on `type_name` or its bases.
    pub fn find_attribute(&self, type_name: &str, attr: &str) -> Option<&AttributeDecl> {
        self.type_chain(type_name).into_iter().find_map(|name| {
            self.complex
                .get(name)
                .and_then(|c| c.attributes.iter().find(|a| a.name == attr))
        })
    }

    /// Every attribute declared on `type_name` and its bases.
    pub fn all_attributes(&self, type_name: &str) -> Vec<&AttributeDecl> {
        self.type_chain(type_name)
            .into_iter()
            .filter_map(|name| self.complex.get(name))
            .flat_map(|c| c.attributes.iter())
            .collect()
    }

    /// The effective content model of `type_name`, inherited content included.
    pub fn content_model(&self, type_name: &str) -> Option<ContentModel> {
        let ty = self.complex.get(type_name)?;
        let inherited = match (ty.derivation, &ty.base) {
            (Some(Derivation::Extension), Some(base)) if base != type_name => {
                self.content_model(base)
            }
            _ => None,
        };
        match (inherited, &ty.particle) {
            (Some(_), Some(_)) => Some(ContentModel {
                kind: ParticleKind::Sequence,
                max_occurs: 1,
            }),
            (Some(model), None) => Some(model),
            (None, Some(p)) => Some(ContentModel {
                kind: p.kind,
                max_occurs: p.max_occurs,
            }),
            (None, None) => None,
        }
    }

    /// Whether `node`'s declaration precedes `element`'s in `type_name`'s sequence,
    /// searching bases first.
    pub fn find_prev_node(&self, type_name: &str, node: &str, element: &str) -> bool {
        let Some(ty) = self.complex.get(type_name) else {
            return false;
        };
        if let Some(base) = ty.base.as_deref() {
            if base != type_name && self.find_prev_node(base, node, element) {
                return true;
            }
        }
        let Some(particle) = ty.particle.as_ref() else {
            return false;
        };
        if particle.kind != ParticleKind::Sequence {
            return false;
        }
        for item in &particle.items {
            if item.name == node {
                return true;
            }
            if item.name == element {
                return false;
            }
        }
        false
    }

    /// Whether `type_name` is a list of enumeration-only tokens (a flag set).
    pub fn is_enum_list(&self, type_name: &str) -> bool {
        self.type_chain(type_name).into_iter().any(|name| {
            self.simple
                .get(name)
                .and_then(|s| s.list_item.as_deref())
                .and_then(|item| self.simple.get(item))
                .is_some_and(SimpleType::is_enumeration)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:xas="uri:ea.com:eala:asset:schema">
  <xs:simpleType name="AssetReference"><xs:restriction base="xs:string"/></xs:simpleType>
  <xs:simpleType name="WeakReference"><xs:restriction base="AssetReference"/></xs:simpleType>
  <xs:simpleType name="FileReference"><xs:restriction base="xs:string"/></xs:simpleType>
  <xs:simpleType name="WeaponRef" xas:refType="Weapon"><xs:restriction base="AssetReference"/></xs:simpleType>
  <xs:simpleType name="Flag">
    <xs:restriction base="xs:string">
      <xs:enumeration value="FAST"/>
      <xs:enumeration value="SLOW"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="FlagSet"><xs:list itemType="Flag"/></xs:simpleType>
  <xs:complexType name="BaseAssetType">
    <xs:attribute name="id" type="xs:string" use="required"/>
  </xs:complexType>
  <xs:complexType name="BaseInheritableAsset">
    <xs:complexContent><xs:extension base="BaseAssetType"/></xs:complexContent>
  </xs:complexType>
  <xs:complexType name="Weapon">
    <xs:complexContent>
      <xs:extension base="BaseInheritableAsset">
        <xs:sequence>
          <xs:element name="Damage" type="xs:int" minOccurs="0"/>
          <xs:element name="Tag" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
        <xs:attribute name="flags" type="FlagSet"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="Rifle">
    <xs:complexContent>
      <xs:extension base="Weapon">
        <xs:sequence>
          <xs:element name="Scope" type="xs:string" minOccurs="0"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="Unit">
    <xs:complexContent>
      <xs:extension base="BaseInheritableAsset">
        <xs:sequence>
          <xs:element name="Weapon" type="WeaponRef" minOccurs="0" maxOccurs="unbounded"/>
          <xs:element name="Escort" type="AssetReference" xas:refType="Unit" minOccurs="0"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="Weapon" type="Weapon"/>
  <xs:element name="Rifle" type="Rifle"/>
  <xs:element name="Unit" type="Unit"/>
</xs:schema>"#;

    pub(crate) fn schema() -> SchemaSet {
        SchemaSet::parse(XSD).unwrap()
    }

    #[test]
    fn derivation_chain() {
        let s = schema();
        assert!(s.is_derived_from("Rifle", "Weapon"));
        assert!(s.is_derived_from("Rifle", "BaseAssetType"));
        assert!(s.is_derived_from("Weapon", "Weapon"));
        assert!(!s.is_derived_from("Weapon", "Rifle"));
        assert!(s.is_derived_from("WeakReference", "AssetReference"));
        assert_eq!(s.type_chain("Rifle").last(), Some(&"BaseAssetType"));
    }

    #[test]
    fn derived_types_are_flattened() {
        let s = schema();
        let derived = s.derived_types("BaseInheritableAsset").unwrap();
        assert!(derived.iter().any(|d| d == "Weapon"));
        assert!(derived.iter().any(|d| d == "Rifle"));
        assert!(derived.iter().any(|d| d == "Unit"));
        assert!(!derived.iter().any(|d| d == "BaseInheritableAsset"));
        assert_eq!(s.derived_types("Weapon").unwrap(), ["Rifle".to_string()]);
        assert!(s.derived_types("Rifle").is_none());
    }

    #[test]
    fn asset_dependency_counts() {
        let s = schema();
        // Unit references Weapon and itself.
        assert_eq!(s.asset_dependency_count("Unit"), 2);
        assert_eq!(s.asset_dependency_count("Weapon"), 0);
        assert_eq!(s.asset_dependency_count("Nope"), 0);
    }

    #[test]
    fn find_in_base_searches_ancestors() {
        let s = schema();
        assert_eq!(s.find_in_base("Rifle", "Damage").unwrap().name, "Damage");
        assert_eq!(s.find_in_base("Rifle", "Scope").unwrap().name, "Scope");
        assert!(s.find_in_base("Weapon", "Scope").is_none());
        assert_eq!(s.find_attribute("Rifle", "id").unwrap().name, "id");
        assert!(s.find_attribute("Rifle", "flags").is_some());
    }

    #[test]
    fn content_model_follows_extension() {
        let s = schema();
        assert_eq!(s.content_model("Weapon").unwrap().kind, ParticleKind::Sequence);
        assert_eq!(s.content_model("Rifle").unwrap().kind, ParticleKind::Sequence);
        assert!(s.content_model("BaseAssetType").is_none());
    }

    #[test]
    fn prev_node_order() {
        let s = schema();
        assert!(s.find_prev_node("Weapon", "Damage", "Tag"));
        assert!(!s.find_prev_node("Weapon", "Tag", "Damage"));
        assert!(s.find_prev_node("Rifle", "Tag", "Scope"));
    }

    #[test]
    fn ref_types() {
        let s = schema();
        assert_eq!(s.ref_type_of("WeaponRef"), Some("Weapon"));
        assert_eq!(s.ref_type_of("AssetReference"), None);
        assert!(s.is_enum_list("FlagSet"));
        assert!(!s.is_enum_list("Flag"));
    }

    #[test]
    fn builtin_lookups_borrow_the_queried_name() {
        let s = schema();
        let name = String::from("xs:int");
        match s.get_type(&name) {
            Some(TypeDef::Builtin(local)) => assert_eq!(local, "int"),
            other => panic!("expected a built-in, got {other:?}"),
        }
        assert_eq!(s.base_of(&name), None);
        assert_eq!(s.ref_type_of(&name), None);
        let rifle = String::from("Rifle");
        assert_eq!(s.base_of(&rifle), Some("Weapon"));
        assert!(matches!(s.get_type(&rifle), Some(TypeDef::Complex(_))));
    }

    #[test]
    fn missing_base_asset_type() {
        let err = SchemaSet::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MissingType(_)));
    }

    #[test]
    fn reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xsd");
        std::fs::write(&path, XSD).unwrap();
        let mut s = SchemaSet::load(&path).unwrap();
        assert!(!s.reload_if_changed().unwrap());
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();
        assert!(s.is_stale());
        assert!(s.reload_if_changed().unwrap());
        assert!(!s.is_stale());
    }
}
