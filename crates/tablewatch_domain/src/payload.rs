use serde_json::Value;

/// Index of a node inside a [`PayloadTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadNode {
    Null,
    Bool(bool),
    Number(String),
    Text(String),
    Map(Vec<(String, NodeId)>),
    List(Vec<NodeId>),
}

impl PayloadNode {
    pub fn is_composite(&self) -> bool {
        matches!(self, PayloadNode::Map(_) | PayloadNode::List(_))
    }

    /// Text of a scalar node; `None` for maps and lists.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            PayloadNode::Null => Some("null".to_string()),
            PayloadNode::Bool(value) => Some(value.to_string()),
            PayloadNode::Number(value) | PayloadNode::Text(value) => Some(value.clone()),
            PayloadNode::Map(_) | PayloadNode::List(_) => None,
        }
    }
}

static MISSING: PayloadNode = PayloadNode::Null;

/// Arena-backed tree of one observed payload.
///
/// Children are referenced by [`NodeId`], so a node may be shared or even
/// point back at one of its ancestors. Consumers that walk the tree must keep
/// a visited set of composite nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadTree {
    nodes: Vec<PayloadNode>,
    root: Option<NodeId>,
}

impl PayloadTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: &Value) -> Self {
        let mut tree = Self::new();
        let root = tree.ingest(value);
        tree.root = Some(root);
        tree
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_json(&value))
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids from another tree resolve to [`PayloadNode::Null`].
    pub fn node(&self, id: NodeId) -> &PayloadNode {
        self.nodes.get(id.0).unwrap_or(&MISSING)
    }

    fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn push(&mut self, node: PayloadNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Adds `key -> child` to the map at `map`. Returns false if `map` is not a
    /// map or either id is not part of this tree.
    pub fn insert_entry(&mut self, map: NodeId, key: impl Into<String>, child: NodeId) -> bool {
        if !self.contains(child) {
            return false;
        }
        match self.nodes.get_mut(map.0) {
            Some(PayloadNode::Map(entries)) => {
                entries.push((key.into(), child));
                true
            }
            _ => false,
        }
    }

    /// Appends `child` to the list at `list`. Returns false if `list` is not a
    /// list or either id is not part of this tree.
    pub fn push_item(&mut self, list: NodeId, child: NodeId) -> bool {
        if !self.contains(child) {
            return false;
        }
        match self.nodes.get_mut(list.0) {
            Some(PayloadNode::List(items)) => {
                items.push(child);
                true
            }
            _ => false,
        }
    }

    /// Space-joined text of a scalar or of a list made only of scalars.
    pub fn flat_text(&self, id: NodeId) -> Option<String> {
        match self.node(id) {
            PayloadNode::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.node(*item).scalar_text()?);
                }
                Some(parts.join(" "))
            }
            node => node.scalar_text(),
        }
    }

    fn ingest(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Null => self.push(PayloadNode::Null),
            Value::Bool(flag) => self.push(PayloadNode::Bool(*flag)),
            Value::Number(number) => self.push(PayloadNode::Number(number.to_string())),
            Value::String(text) => self.push(PayloadNode::Text(text.clone())),
            Value::Array(items) => {
                let id = self.push(PayloadNode::List(Vec::with_capacity(items.len())));
                for item in items {
                    let child = self.ingest(item);
                    self.push_item(id, child);
                }
                id
            }
            Value::Object(map) => {
                let id = self.push(PayloadNode::Map(Vec::with_capacity(map.len())));
                for (key, item) in map {
                    let child = self.ingest(item);
                    self.insert_entry(id, key.clone(), child);
                }
                id
            }
        }
    }
}
