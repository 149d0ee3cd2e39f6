//! The owned element tree.

/// What schema validation learned about a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Name of the node's schema type (`xs:` prefixed for built-ins).
    pub type_name: String,
    /// The asset type a reference-typed node must point at, if declared.
    pub ref_type: Option<String>,
}

impl SchemaInfo {
    /// Annotation with a type name and no reference type.
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ref_type: None,
        }
    }
}

/// One child of an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data (CDATA is folded into text).
    Text(String),
    /// A comment, kept so round-tripped documents stay readable.
    Comment(String),
}

/// An attribute with its resolved namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// The prefix the attribute was written with, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Namespace URI. Unprefixed attributes are never in a namespace.
    pub namespace: Option<String>,
    /// Unescaped value.
    pub value: String,
    /// Assigned by schema validation.
    pub schema: Option<SchemaInfo>,
}

impl Attribute {
    /// Creates an attribute in no namespace.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            namespace: None,
            value: value.into(),
            schema: None,
        }
    }

    /// `prefix:name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// An element with its resolved namespace, attributes and children.
///
/// `schema` is filled in by schema validation and ignored by serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// The prefix the element was written with, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Namespace URI.
    pub namespace: Option<String>,
    /// Attributes in document order, namespace declarations excluded.
    pub attributes: Vec<Attribute>,
    /// Children in document order.
    pub children: Vec<Node>,
    /// Assigned by schema validation.
    pub schema: Option<SchemaInfo>,
}

impl Element {
    /// Creates an empty element in no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates an empty, unprefixed element in `namespace`.
    pub fn in_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// An empty element with the same name, prefix and namespace as `self`.
    pub fn shallow_copy(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            ..Self::default()
        }
    }

    /// `prefix:name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The schema type name assigned by validation.
    pub fn schema_type(&self) -> Option<&str> {
        self.schema.as_ref().map(|s| s.type_name.as_str())
    }

    /// Value of the un-namespaced attribute `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of attribute `name` in `namespace`.
    pub fn attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets the un-namespaced attribute `name`, adding it if absent.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.name == name)
        {
            Some(a) => a.value = value,
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    /// Removes the un-namespaced attribute `name`, returning its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self
            .attributes
            .iter()
            .position(|a| a.namespace.is_none() && a.name == name)?;
        Some(self.attributes.remove(pos).value)
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Mutable child elements in document order.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Whether the element has any element or text children.
    pub fn has_content(&self) -> bool {
        self.children.iter().any(|n| !matches!(n, Node::Comment(_)))
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the element has at least one text child.
    pub fn has_text(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Text(_)))
    }

    /// Replaces all direct text children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let first = self.children.iter().position(|n| matches!(n, Node::Text(_)));
        self.children.retain(|n| !matches!(n, Node::Text(_)));
        let at = first.unwrap_or(self.children.len()).min(self.children.len());
        self.children.insert(at, Node::Text(text.into()));
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Visits this element and every descendant element in document order.
    pub fn try_walk_mut<E>(
        &mut self,
        f: &mut dyn FnMut(&mut Element) -> Result<(), E>,
    ) -> Result<(), E> {
        f(self)?;
        for child in self.elements_mut() {
            child.try_walk_mut(f)?;
        }
        Ok(())
    }

    /// Visits this element and every descendant element in document order.
    pub fn walk(&self, f: &mut dyn FnMut(&Element)) {
        f(self);
        for child in self.elements() {
            child.walk(f);
        }
    }
}
