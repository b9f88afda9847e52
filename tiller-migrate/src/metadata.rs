//! Metadata reader: the set of loaded assemblies and the types they define.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assembly::{Assembly, AssemblyIdentity, AssemblyLoader, ContextType, MigrationType, TypeDef};
use crate::error::{MigrateResult, MigrationError};

/// A context type together with the assembly that defines it.
#[derive(Clone)]
pub struct DiscoveredContext {
    /// Defining assembly.
    pub assembly: AssemblyIdentity,
    /// The type.
    pub ty: Arc<dyn ContextType>,
}

/// The target assembly and the closure of its loadable references.
pub struct AssemblyScope {
    target: Box<dyn Assembly>,
    referenced: Vec<Box<dyn Assembly>>,
}

impl AssemblyScope {
    /// Load the target assembly, its references and the context-assembly hint.
    ///
    /// References that the loader cannot find are skipped. A context-assembly
    /// hint that cannot be found is an error.
    pub fn load(
        loader: &dyn AssemblyLoader,
        path: &Path,
        search_paths: &[PathBuf],
        context_assembly: Option<&str>,
    ) -> MigrateResult<Self> {
        let target = loader.load(path, search_paths)?;
        tracing::debug!(assembly = %target.identity(), "Loaded target assembly");

        let mut seen = HashSet::new();
        seen.insert(target.identity().name.clone());

        let mut referenced: Vec<Box<dyn Assembly>> = Vec::new();

        if let Some(name) = context_assembly {
            if seen.insert(name.to_string()) {
                let assembly = loader.resolve(name, search_paths)?.ok_or_else(|| {
                    MigrationError::manifest(format!(
                        "Context assembly '{}' could not be found in the search paths",
                        name
                    ))
                })?;
                referenced.push(assembly);
            }
        }

        let mut queue: VecDeque<String> = target.references().into();
        let mut next = 0;
        loop {
            while let Some(name) = queue.pop_front() {
                if !seen.insert(name.clone()) {
                    continue;
                }
                match loader.resolve(&name, search_paths)? {
                    Some(assembly) => {
                        tracing::debug!(assembly = %assembly.identity(), "Loaded referenced assembly");
                        referenced.push(assembly);
                    }
                    None => tracing::debug!(assembly = %name, "Skipping unresolved reference"),
                }
            }

            // Walk the references of everything loaded so far.
            if next >= referenced.len() {
                break;
            }
            queue.extend(referenced[next].references());
            next += 1;
        }

        Ok(Self { target, referenced })
    }

    /// The target assembly.
    pub fn target(&self) -> &dyn Assembly {
        self.target.as_ref()
    }

    /// All loaded assemblies, target first.
    pub fn assemblies(&self) -> impl Iterator<Item = &dyn Assembly> {
        std::iter::once(self.target.as_ref()).chain(self.referenced.iter().map(|a| a.as_ref()))
    }

    /// Identities of all loaded assemblies.
    pub fn identities(&self) -> Vec<AssemblyIdentity> {
        self.assemblies().map(|a| a.identity().clone()).collect()
    }

    /// Context types across every loaded assembly.
    pub fn context_types(&self) -> Vec<DiscoveredContext> {
        self.assemblies()
            .flat_map(|assembly| {
                let identity = assembly.identity().clone();
                assembly.types().into_iter().filter_map(move |ty| match ty {
                    TypeDef::Context(ty) => Some(DiscoveredContext {
                        assembly: identity.clone(),
                        ty,
                    }),
                    _ => None,
                })
            })
            .collect()
    }

    /// Migration types defined by the target assembly.
    pub fn migration_types(&self) -> Vec<Arc<dyn MigrationType>> {
        self.target
            .types()
            .into_iter()
            .filter_map(|ty| match ty {
                TypeDef::Migration(ty) => Some(ty),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{StaticAssembly, StaticLoader};
    use crate::model::Model;

    struct Ctx(&'static str);

    impl ContextType for Ctx {
        fn full_name(&self) -> &str {
            self.0
        }

        fn model(&self) -> Model {
            Model::new()
        }
    }

    fn loader() -> StaticLoader {
        StaticLoader::new()
            .register("App", || {
                StaticAssembly::new("App")
                    .reference("Contexts")
                    .reference("System.Runtime")
                    .context(Ctx("App.MainContext"))
            })
            .register("Contexts", || {
                StaticAssembly::new("Contexts")
                    .reference("Shared")
                    .reference("App")
                    .context(Ctx("Contexts.Context1"))
            })
            .register("Shared", || StaticAssembly::new("Shared").context(Ctx("Shared.Audit")))
            .register("Extra", || StaticAssembly::new("Extra").context(Ctx("Extra.Other")))
    }

    #[test]
    fn test_scope_walks_reference_closure() {
        let scope = AssemblyScope::load(&loader(), Path::new("App.dll"), &[], None).unwrap();

        let names: Vec<String> = scope.identities().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["App", "Contexts", "Shared"]);

        let contexts: Vec<String> = scope
            .context_types()
            .iter()
            .map(|c| c.ty.full_name().to_string())
            .collect();
        assert_eq!(contexts, vec!["App.MainContext", "Contexts.Context1", "Shared.Audit"]);
    }

    #[test]
    fn test_context_assembly_hint() {
        let scope =
            AssemblyScope::load(&loader(), Path::new("App.dll"), &[], Some("Extra")).unwrap();
        assert!(scope.identities().iter().any(|i| i.name == "Extra"));

        let missing = AssemblyScope::load(&loader(), Path::new("App.dll"), &[], Some("Nope"));
        assert!(matches!(missing, Err(MigrationError::Manifest(_))));
    }
}
