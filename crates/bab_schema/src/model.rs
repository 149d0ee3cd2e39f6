//! Schema declarations.

/// `maxOccurs="unbounded"`.
pub const UNBOUNDED: u32 = u32::MAX;

/// The compositor of a content model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleKind {
    /// `xs:sequence`
    Sequence,
    /// `xs:choice`
    Choice,
    /// `xs:all`
    All,
}

/// A content model. Nested compositors are flattened into `items`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Particle {
    /// The outermost compositor.
    pub kind: ParticleKind,
    /// The compositor's own `maxOccurs`.
    pub max_occurs: u32,
    /// Element declarations in declaration order.
    pub items: Vec<ElementDecl>,
}

/// A local or global element declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementDecl {
    /// Element name.
    pub name: String,
    /// Declared type (`xs:` prefixed for built-ins).
    pub type_name: Option<String>,
    /// `minOccurs`.
    pub min_occurs: u32,
    /// `maxOccurs`.
    pub max_occurs: u32,
    /// `xas:refType` on the declaration.
    pub ref_type: Option<String>,
    /// Whether the compositor directly containing the declaration is a sequence.
    pub in_sequence: bool,
}

/// How a type derives from its base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Derivation {
    /// `xs:extension`
    Extension,
    /// `xs:restriction`
    Restriction,
}

/// An attribute declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Attribute name.
    pub name: String,
    /// Declared simple type.
    pub type_name: String,
    /// `use="required"`.
    pub required: bool,
    /// `xas:refType` on the declaration.
    pub ref_type: Option<String>,
}

/// A complex type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComplexType {
    /// Type name; anonymous types get a synthesized `Owner.element` name.
    pub name: String,
    /// Base type, if derived.
    pub base: Option<String>,
    /// How the type derives from `base`.
    pub derivation: Option<Derivation>,
    /// The type's own content model, excluding anything inherited.
    pub particle: Option<Particle>,
    /// The type's own attributes, excluding anything inherited.
    pub attributes: Vec<AttributeDecl>,
    /// Whether the content is text (`xs:simpleContent`).
    pub simple_content: bool,
    /// `xas:refType` on the type.
    pub ref_type: Option<String>,
    /// Hash of the type's declaration, changes whenever the declaration is edited.
    pub fingerprint: u32,
}

/// A simple type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleType {
    /// Type name; anonymous types get a synthesized name.
    pub name: String,
    /// The restricted base type.
    pub base: Option<String>,
    /// Enumeration facets.
    pub enumerations: Vec<String>,
    /// Whether the restriction has facets other than enumerations.
    pub other_facets: bool,
    /// Item type of an `xs:list`.
    pub list_item: Option<String>,
    /// `xas:refType` on the type.
    pub ref_type: Option<String>,
}

impl SimpleType {
    /// A restriction consisting solely of enumerations.
    pub fn is_enumeration(&self) -> bool {
        !self.enumerations.is_empty() && !self.other_facets
    }
}
