//! Context descriptors and name resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assembly::{AssemblyIdentity, ContextType};
use crate::error::{MigrateResult, MigrationError};
use crate::metadata::{AssemblyScope, DiscoveredContext};

/// Identifies exactly one context type. Crosses the isolation boundary as data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextDescriptor {
    /// Assembly-qualified identity: `Full.Name, Assembly, Version=x`.
    pub type_identity: String,
    /// Namespace-qualified type name.
    pub full_name: String,
    /// Short type name.
    pub display_name: String,
    /// Defining assembly.
    pub assembly: AssemblyIdentity,
}

impl ContextDescriptor {
    /// Describe a context type defined in `assembly`.
    pub fn new(full_name: impl Into<String>, assembly: AssemblyIdentity) -> Self {
        let full_name = full_name.into();
        let display_name = short_name(&full_name).to_string();
        Self {
            type_identity: format!("{}, {}", full_name, assembly),
            full_name,
            display_name,
            assembly,
        }
    }

    /// Create a descriptor for a discovered context type.
    pub fn from_discovered(context: &DiscoveredContext) -> Self {
        Self::new(context.ty.full_name(), context.assembly.clone())
    }

    /// Check whether a declared association names this context.
    ///
    /// The association may be the full type name or the assembly-qualified
    /// identity. Matching is exact.
    pub fn is_named_by(&self, association: &str) -> bool {
        association == self.full_name || association == self.type_identity
    }

    /// Lowercased short name without a trailing `Context`.
    pub fn normalized_name(&self) -> String {
        normalize(&self.display_name)
    }
}

impl std::fmt::Display for ContextDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Last segment of a dotted type name.
pub fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

fn normalize(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix("context") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => lower,
    }
}

/// Resolve one context by name, or the only context when no name is given.
///
/// Names match the full type name case-insensitively first, then the short
/// name with an optional `Context` suffix.
pub fn resolve<'a>(
    contexts: &'a [ContextDescriptor],
    name: Option<&str>,
) -> MigrateResult<&'a ContextDescriptor> {
    let candidates = |matches: &[&ContextDescriptor]| {
        matches.iter().map(|c| c.full_name.clone()).collect::<Vec<_>>()
    };

    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return match contexts {
            [only] => Ok(only),
            [] => Err(MigrationError::ContextNotFound(String::new())),
            many => Err(MigrationError::AmbiguousContext {
                requested: None,
                candidates: candidates(&many.iter().collect::<Vec<_>>()),
            }),
        };
    };

    let by_full_name: Vec<&ContextDescriptor> = contexts
        .iter()
        .filter(|c| c.full_name.eq_ignore_ascii_case(name))
        .collect();

    let matches = if by_full_name.is_empty() {
        let wanted = normalize(name);
        contexts
            .iter()
            .filter(|c| c.normalized_name() == wanted)
            .collect()
    } else {
        by_full_name
    };

    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(MigrationError::ContextNotFound(name.to_string())),
        many => Err(MigrationError::AmbiguousContext {
            requested: Some(name.to_string()),
            candidates: candidates(many),
        }),
    }
}

/// A resolved context: its descriptor and the live type behind it.
#[derive(Clone)]
pub struct ResolvedContext {
    /// Descriptor.
    pub descriptor: ContextDescriptor,
    /// The context type.
    pub ty: Arc<dyn ContextType>,
}

/// Describe every context type in scope.
pub fn list_contexts(scope: &AssemblyScope) -> Vec<ContextDescriptor> {
    scope
        .context_types()
        .iter()
        .map(ContextDescriptor::from_discovered)
        .collect()
}

/// Resolve a context in scope by name, or the only one when no name is given.
pub fn resolve_in(scope: &AssemblyScope, name: Option<&str>) -> MigrateResult<ResolvedContext> {
    let discovered = scope.context_types();
    let descriptors: Vec<ContextDescriptor> = discovered
        .iter()
        .map(ContextDescriptor::from_discovered)
        .collect();

    let descriptor = resolve(&descriptors, name)?;
    let index = descriptors
        .iter()
        .position(|d| std::ptr::eq(d, descriptor))
        .unwrap_or_default();

    tracing::debug!(context = %descriptor.full_name, "Resolved context");

    Ok(ResolvedContext {
        descriptor: descriptor.clone(),
        ty: Arc::clone(&discovered[index].ty),
    })
}
