//! In-memory name tree
//!
//! Scopes hold child scopes and bindings by name. A binding carries a lease
//! deadline unless the tree was created without leases; `expire` drops the
//! bindings whose deadline has passed.

use crate::error::{NameError, Result};
use crate::types::{join_path, parent_and_name, split_path, BindingEntry, BindingInfo, RebindResult};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

enum Node {
    Scope(Scope),
    Binding(Bound),
}

#[derive(Default)]
struct Scope {
    description: String,
    children: BTreeMap<String, Node>,
}

struct Bound {
    info: BindingInfo,
    expires: Option<Instant>,
}

/// Tree of scopes and leased bindings
pub struct NameTree {
    root: Scope,
    lease: Option<Duration>,
    bindings: usize,
}

impl NameTree {
    /// `lease` of `None` makes every binding permanent
    pub fn new(lease: Option<Duration>) -> Self {
        Self {
            root: Scope {
                description: "Root scope".to_string(),
                children: BTreeMap::new(),
            },
            lease,
            bindings: 0,
        }
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
    }

    fn deadline(&self, now: Instant) -> Option<Instant> {
        self.lease.map(|lease| now + lease)
    }

    fn scope(&self, path: &str) -> Result<&Scope> {
        let mut scope = &self.root;
        for part in split_path(path)? {
            scope = match scope.children.get(part) {
                Some(Node::Scope(child)) => child,
                Some(Node::Binding(_)) => return Err(NameError::NotAScope(path.to_string())),
                None => return Err(NameError::NotFound(path.to_string())),
            };
        }
        Ok(scope)
    }

    fn scope_mut(&mut self, path: &str) -> Result<&mut Scope> {
        let mut scope = &mut self.root;
        for part in split_path(path)? {
            scope = match scope.children.get_mut(part) {
                Some(Node::Scope(child)) => child,
                Some(Node::Binding(_)) => return Err(NameError::NotAScope(path.to_string())),
                None => return Err(NameError::NotFound(path.to_string())),
            };
        }
        Ok(scope)
    }

    fn node(&self, path: &str) -> Result<Option<&Node>> {
        let (parent, name) = parent_and_name(path)?;
        match self.scope(&parent) {
            Ok(scope) => Ok(scope.children.get(&name)),
            Err(NameError::NotFound(_)) | Err(NameError::NotAScope(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Add a new binding. The parent scope must already exist.
    pub fn bind(&mut self, path: &str, info: BindingInfo, now: Instant) -> Result<()> {
        let (parent, name) = parent_and_name(path)?;
        let expires = self.deadline(now);
        let scope = self.scope_mut(&parent)?;
        if scope.children.contains_key(&name) {
            return Err(NameError::AlreadyExists(path.to_string()));
        }
        scope
            .children
            .insert(name, Node::Binding(Bound { info, expires }));
        self.bindings += 1;
        Ok(())
    }

    /// Refresh an existing binding or create it, along with any missing
    /// parent scopes
    pub fn rebind(&mut self, path: &str, info: BindingInfo, now: Instant) -> RebindResult {
        match self.try_rebind(path, info, now) {
            Ok(()) => RebindResult::Success,
            Err(NameError::NotABinding(_)) => RebindResult::NotATerminal,
            Err(_) => RebindResult::Exception,
        }
    }

    fn try_rebind(&mut self, path: &str, info: BindingInfo, now: Instant) -> Result<()> {
        let (parent, name) = parent_and_name(path)?;
        let expires = self.deadline(now);
        self.create_scope_path(&parent)?;
        let scope = self.scope_mut(&parent)?;
        match scope.children.get_mut(&name) {
            Some(Node::Binding(bound)) => {
                bound.info = info;
                bound.expires = expires;
            }
            Some(Node::Scope(_)) => return Err(NameError::NotABinding(path.to_string())),
            None => {
                scope
                    .children
                    .insert(name, Node::Binding(Bound { info, expires }));
                self.bindings += 1;
            }
        }
        Ok(())
    }

    /// Push out the lease deadline of a binding. False if there is no
    /// binding at `path`.
    pub fn renew(&mut self, path: &str, now: Instant) -> bool {
        let expires = self.deadline(now);
        let Ok((parent, name)) = parent_and_name(path) else {
            return false;
        };
        match self.scope_mut(&parent) {
            Ok(scope) => match scope.children.get_mut(&name) {
                Some(Node::Binding(bound)) => {
                    bound.expires = expires;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    /// The binding at `path`, if there is one
    pub fn lookup(&self, path: &str) -> Result<Option<&BindingInfo>> {
        Ok(match self.node(path)? {
            Some(Node::Binding(bound)) => Some(&bound.info),
            _ => None,
        })
    }

    pub fn binding_exists(&self, path: &str) -> Result<bool> {
        Ok(matches!(self.node(path)?, Some(Node::Binding(_))))
    }

    pub fn scope_exists(&self, path: &str) -> Result<bool> {
        match self.scope(path) {
            Ok(_) => Ok(true),
            Err(NameError::NotFound(_)) | Err(NameError::NotAScope(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create one scope under an existing parent
    pub fn create_scope(&mut self, parent: &str, name: &str, description: &str) -> Result<()> {
        let path = join_path(parent, name);
        if name.is_empty() || name.contains('/') {
            return Err(NameError::BadPath(path));
        }
        let scope = self.scope_mut(parent)?;
        if scope.children.contains_key(name) {
            return Err(NameError::AlreadyExists(path));
        }
        scope.children.insert(
            name.to_string(),
            Node::Scope(Scope {
                description: description.to_string(),
                children: BTreeMap::new(),
            }),
        );
        Ok(())
    }

    /// Create every missing scope along `path`
    pub fn create_scope_path(&mut self, path: &str) -> Result<()> {
        let parts = split_path(path)?;
        let mut scope = &mut self.root;
        for part in parts {
            let child = scope
                .children
                .entry(part.to_string())
                .or_insert_with(|| Node::Scope(Scope::default()));
            scope = match child {
                Node::Scope(child) => child,
                Node::Binding(_) => return Err(NameError::NotAScope(path.to_string())),
            };
        }
        Ok(())
    }

    pub fn remove_binding(&mut self, path: &str) -> Result<()> {
        let (parent, name) = parent_and_name(path)?;
        let scope = self
            .scope_mut(&parent)
            .map_err(|_| NameError::NotFound(path.to_string()))?;
        match scope.children.get(&name) {
            Some(Node::Binding(_)) => {
                scope.children.remove(&name);
                self.bindings -= 1;
                Ok(())
            }
            Some(Node::Scope(_)) => Err(NameError::NotABinding(path.to_string())),
            None => Err(NameError::NotFound(path.to_string())),
        }
    }

    /// Remove a scope and everything under it
    pub fn remove_scope(&mut self, path: &str) -> Result<()> {
        let (parent, name) = parent_and_name(path)?;
        let scope = self
            .scope_mut(&parent)
            .map_err(|_| NameError::NotFound(path.to_string()))?;
        match scope.children.get(&name) {
            Some(Node::Scope(_)) => {}
            Some(Node::Binding(_)) => return Err(NameError::NotAScope(path.to_string())),
            None => return Err(NameError::NotFound(path.to_string())),
        }
        if let Some(Node::Scope(removed)) = scope.children.remove(&name) {
            self.bindings -= count_bindings(&removed);
        }
        Ok(())
    }

    pub fn scope_description(&self, path: &str) -> Result<&str> {
        Ok(&self.scope(path)?.description)
    }

    /// Bindings directly inside `scope`, in name order
    pub fn enum_bindings(&self, scope: &str) -> Result<Vec<BindingEntry>> {
        Ok(self
            .scope(scope)?
            .children
            .iter()
            .filter_map(|(name, node)| match node {
                Node::Binding(bound) => Some(BindingEntry {
                    name: name.clone(),
                    binding: bound.info.clone(),
                }),
                Node::Scope(_) => None,
            })
            .collect())
    }

    /// Names of the scopes directly inside `scope`, in name order
    pub fn enum_subscopes(&self, scope: &str) -> Result<Vec<String>> {
        Ok(self
            .scope(scope)?
            .children
            .iter()
            .filter(|(_, node)| matches!(node, Node::Scope(_)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    pub fn update_extra(&mut self, path: &str, index: u32, value: &str) -> Result<()> {
        let (parent, name) = parent_and_name(path)?;
        let scope = self
            .scope_mut(&parent)
            .map_err(|_| NameError::NotFound(path.to_string()))?;
        match scope.children.get_mut(&name) {
            Some(Node::Binding(bound)) => bound.info.set_extra(index, value),
            Some(Node::Scope(_)) => Err(NameError::NotABinding(path.to_string())),
            None => Err(NameError::NotFound(path.to_string())),
        }
    }

    /// Drop every binding whose lease ran out before `now`. Returns the
    /// removed paths.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut removed = Vec::new();
        expire_scope(&mut self.root, "/", now, &mut removed);
        self.bindings -= removed.len();
        removed
    }
}

fn count_bindings(scope: &Scope) -> usize {
    scope
        .children
        .values()
        .map(|node| match node {
            Node::Binding(_) => 1,
            Node::Scope(child) => count_bindings(child),
        })
        .sum()
}

fn expire_scope(scope: &mut Scope, path: &str, now: Instant, removed: &mut Vec<String>) {
    scope.children.retain(|name, node| match node {
        Node::Binding(bound) => match bound.expires {
            Some(deadline) if deadline <= now => {
                removed.push(join_path(path, name));
                false
            }
            _ => true,
        },
        Node::Scope(child) => {
            expire_scope(child, &join_path(path, name), now, removed);
            true
        }
    });
}
