//! Dependency ordering of migrations.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{MigrateError, Result};
use crate::migration::MigrationDefinition;

/// Order definitions so every dependency (required or optional) runs before
/// its dependents.
///
/// Only edges between the given definitions count; a dependency outside the
/// set does not constrain the order. Ties keep declaration order, so the
/// result is deterministic. A cycle is a configuration error naming the
/// migrations involved.
pub fn dependency_order<'a>(
    definitions: &[&'a MigrationDefinition],
) -> Result<Vec<&'a MigrationDefinition>> {
    let index: BTreeMap<&str, usize> = definitions
        .iter()
        .enumerate()
        .map(|(i, def)| (def.id.as_str(), i))
        .collect();

    let mut pending = vec![0usize; definitions.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); definitions.len()];
    for (i, def) in definitions.iter().enumerate() {
        let deps: BTreeSet<usize> = def
            .all_dependencies()
            .filter_map(|dep| index.get(dep).copied())
            .collect();
        pending[i] = deps.len();
        for dep in deps {
            dependents[dep].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..definitions.len()).filter(|&i| pending[i] == 0).collect();
    let mut ordered = Vec::with_capacity(definitions.len());
    while let Some(next) = ready.pop_first() {
        ordered.push(definitions[next]);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if ordered.len() < definitions.len() {
        let cyclic: Vec<&str> = (0..definitions.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| definitions[i].id.as_str())
            .collect();
        return Err(MigrateError::Config(format!(
            "Circular dependency among migrations: {}",
            cyclic.join(", ")
        )));
    }
    Ok(ordered)
}

/// Add the required dependencies of `selected`, transitively.
pub fn with_required_dependencies<'a>(
    selected: &[&'a MigrationDefinition],
    all: &'a [MigrationDefinition],
) -> Result<Vec<&'a MigrationDefinition>> {
    let by_id: BTreeMap<&str, &MigrationDefinition> =
        all.iter().map(|def| (def.id.as_str(), def)).collect();

    let mut seen: BTreeSet<&str> = selected.iter().map(|def| def.id.as_str()).collect();
    let mut result: Vec<&MigrationDefinition> = selected.to_vec();
    let mut queue: Vec<&MigrationDefinition> = selected.to_vec();

    while let Some(def) = queue.pop() {
        for dep in &def.migration_dependencies.required {
            let dep_def = by_id.get(dep.as_str()).ok_or_else(|| {
                MigrateError::Config(format!(
                    "{} requires unknown migration {}",
                    def.id, dep
                ))
            })?;
            if seen.insert(dep_def.id.as_str()) {
                result.push(dep_def);
                queue.push(dep_def);
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::PluginConfig;
    use crate::migration::Dependencies;

    fn def(id: &str, required: &[&str], optional: &[&str]) -> MigrationDefinition {
        MigrationDefinition {
            id: id.to_string(),
            label: None,
            migration_tags: Vec::new(),
            source: PluginConfig::new("embedded_data"),
            process: Default::default(),
            destination: PluginConfig::new("entity:node_type"),
            migration_dependencies: Dependencies {
                required: required.iter().map(|s| s.to_string()).collect(),
                optional: optional.iter().map(|s| s.to_string()).collect(),
            },
            high_water_property: None,
        }
    }

    fn ids(defs: &[&MigrationDefinition]) -> Vec<String> {
        defs.iter().map(|d| d.id.clone()).collect()
    }

    #[test]
    fn test_dependencies_run_first() {
        let all = [
            def("d6_taxonomy_term", &["d6_taxonomy_vocabulary"], &[]),
            def("d6_field_group", &["d6_node_type"], &["d6_taxonomy_term"]),
            def("d6_taxonomy_vocabulary", &[], &[]),
            def("d6_node_type", &[], &[]),
        ];
        let refs: Vec<&MigrationDefinition> = all.iter().collect();
        let ordered = ids(&dependency_order(&refs).unwrap());
        assert_eq!(
            ordered,
            vec![
                "d6_taxonomy_vocabulary",
                "d6_taxonomy_term",
                "d6_node_type",
                "d6_field_group"
            ]
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let all = [
            def("a", &["b"], &[]),
            def("b", &[], &["c"]),
            def("c", &["a"], &[]),
            def("d", &[], &[]),
        ];
        let refs: Vec<&MigrationDefinition> = all.iter().collect();
        let err = dependency_order(&refs).unwrap_err().to_string();
        assert!(err.contains("Circular dependency"));
        assert!(err.contains("a, b, c"));
        assert!(!err.contains(", d"));
    }

    #[test]
    fn test_edges_outside_the_set_are_ignored() {
        let all = [def("d6_taxonomy_term", &["d6_taxonomy_vocabulary"], &[])];
        let refs: Vec<&MigrationDefinition> = all.iter().collect();
        assert_eq!(ids(&dependency_order(&refs).unwrap()), vec!["d6_taxonomy_term"]);
    }

    #[test]
    fn test_required_dependencies_are_pulled_in() {
        let all = vec![
            def("d6_node_type", &[], &[]),
            def("d6_taxonomy_vocabulary", &[], &[]),
            def("d6_taxonomy_term", &["d6_taxonomy_vocabulary"], &["d6_node_type"]),
        ];
        let selected = vec![&all[2]];
        let expanded = with_required_dependencies(&selected, &all).unwrap();
        let mut names = ids(&expanded);
        names.sort();
        assert_eq!(names, vec!["d6_taxonomy_term", "d6_taxonomy_vocabulary"]);
    }
}
