//! Nested command tree reconstructed from flat, namespaced function names
//!
//! Every path segment becomes a node. Intermediate segments without a function of their own
//! become placeholders, nodes without an action that only host subcommands. Siblings are keyed
//! by name, and the tree is normalized by a stable sort on name at every level once all
//! functions are inserted.

/// Usage shown for placeholders that have no description of their own
pub const PLACEHOLDER_USAGE: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode<A> {
    pub name: String,
    /// One line description
    pub usage: String,
    /// Longer help text
    pub usage_text: String,
    pub hidden: bool,
    /// `None` for placeholders
    pub action: Option<A>,
    pub children: Vec<CommandNode<A>>,
}

impl<A> CommandNode<A> {
    #[must_use]
    pub fn leaf(name: impl Into<String>, action: A) -> Self {
        CommandNode {
            name: name.into(),
            usage: String::new(),
            usage_text: String::new(),
            hidden: false,
            action: Some(action),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn placeholder(name: impl Into<String>, usage: impl Into<String>) -> Self {
        CommandNode {
            name: name.into(),
            usage: usage.into(),
            usage_text: String::new(),
            hidden: false,
            action: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: impl Into<String>, usage_text: impl Into<String>) -> Self {
        self.usage = usage.into();
        self.usage_text = usage_text.into();
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<CommandNode<A>>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.action.is_none()
    }

    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&CommandNode<A>> {
        self.children.iter().find(|c| c.has_name(name))
    }

    fn sort(&mut self) {
        self.children.sort_by(|a, b| a.name.cmp(&b.name));
        for child in &mut self.children {
            child.sort();
        }
    }
}

/// Description used for a placeholder created at the top level of a path.
/// Deeper placeholders always use [`PLACEHOLDER_USAGE`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholder {
    pub usage: String,
    pub usage_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An existing placeholder at the path received the action, keeping its children
    Promoted,
    /// A leaf already exists at the path, the new one was discarded
    AlreadyExists,
    EmptyPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTree<A> {
    pub roots: Vec<CommandNode<A>>,
}

impl<A> Default for CommandTree<A> {
    fn default() -> Self {
        CommandTree { roots: Vec::new() }
    }
}

impl<A> CommandTree<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level node as is, e.g. a built-in command
    pub fn push(&mut self, node: CommandNode<A>) {
        self.roots.push(node);
    }

    /// Insert `leaf` at `path`, creating placeholders for missing intermediate segments.
    ///
    /// The leaf's own name is replaced by the last path segment. When a leaf already
    /// occupies the path the first one wins.
    pub fn insert(
        &mut self,
        path: &[&str],
        mut leaf: CommandNode<A>,
        placeholder: &Placeholder,
    ) -> InsertOutcome {
        let Some((last, parents)) = path.split_last() else {
            return InsertOutcome::EmptyPath;
        };

        let mut scope = &mut self.roots;
        for (depth, segment) in parents.iter().enumerate() {
            let index = match scope.iter().position(|c| c.has_name(segment)) {
                Some(index) => index,
                None => {
                    let node = if depth == 0 {
                        let usage = if placeholder.usage.is_empty() {
                            PLACEHOLDER_USAGE
                        } else {
                            placeholder.usage.as_str()
                        };
                        CommandNode::placeholder(*segment, usage)
                            .with_usage(usage, placeholder.usage_text.clone())
                    } else {
                        CommandNode::placeholder(*segment, PLACEHOLDER_USAGE)
                    };
                    scope.push(node);
                    scope.len() - 1
                }
            };
            scope = &mut scope[index].children;
        }

        leaf.name = (*last).to_string();
        match scope.iter_mut().find(|c| c.has_name(last)) {
            None => {
                scope.push(leaf);
                InsertOutcome::Inserted
            }
            Some(existing) if existing.is_placeholder() => {
                let children = std::mem::take(&mut existing.children);
                *existing = leaf;
                existing.children.extend(children);
                InsertOutcome::Promoted
            }
            Some(_) => InsertOutcome::AlreadyExists,
        }
    }

    /// Stable sort of every sibling set by name
    pub fn sort(&mut self) {
        self.roots.sort_by(|a, b| a.name.cmp(&b.name));
        for node in &mut self.roots {
            node.sort();
        }
    }

    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&CommandNode<A>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.iter().find(|c| c.has_name(first))?;
        for segment in rest {
            node = node.child(segment)?;
        }
        Some(node)
    }
}
