//! Stage ordering and context-reference checks for pipeline definitions.

use std::collections::{HashMap, HashSet};

/// Borrowed view of a stage, enough to order it.
#[derive(Debug, Clone)]
pub struct StageOutline<'a> {
    pub name: &'a str,
    pub depends_on: &'a [String],
    pub tasks: Vec<TaskOutline<'a>>,
}

#[derive(Debug, Clone)]
pub struct TaskOutline<'a> {
    pub id: &'a str,
    pub context: &'a [String],
}

/// Compute the execution order of stages (indices into `stages`).
///
/// Ties are broken by declaration order so the result is deterministic.
/// Errors cover duplicate stage names or task ids, unknown dependencies,
/// cycles, and context references to tasks that do not run earlier.
pub fn stage_order(stages: &[StageOutline<'_>]) -> Result<Vec<usize>, Vec<String>> {
    let mut errors = Vec::new();

    let mut by_name = HashMap::new();
    for (idx, stage) in stages.iter().enumerate() {
        if by_name.insert(stage.name, idx).is_some() {
            errors.push(format!("duplicate stage name '{}'", stage.name));
        }
    }

    let mut task_ids = HashSet::new();
    for stage in stages {
        for task in &stage.tasks {
            if !task_ids.insert(task.id) {
                errors.push(format!("duplicate task id '{}'", task.id));
            }
        }
    }

    let mut indegree = vec![0usize; stages.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    for (idx, stage) in stages.iter().enumerate() {
        for dep in stage.depends_on {
            match by_name.get(dep.as_str()) {
                Some(&dep_idx) if dep_idx == idx => {
                    errors.push(format!("stage '{}' depends on itself", stage.name));
                }
                Some(&dep_idx) => {
                    indegree[idx] += 1;
                    dependents[dep_idx].push(idx);
                }
                None => errors.push(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    stage.name, dep
                )),
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut order = Vec::with_capacity(stages.len());
    let mut done = vec![false; stages.len()];
    while order.len() < stages.len() {
        let Some(next) = (0..stages.len()).find(|idx| !done[*idx] && indegree[*idx] == 0) else {
            let stuck: Vec<&str> = (0..stages.len())
                .filter(|idx| !done[*idx])
                .map(|idx| stages[idx].name)
                .collect();
            return Err(vec![format!(
                "dependency cycle between stages: {}",
                stuck.join(", ")
            )]);
        };
        done[next] = true;
        order.push(next);
        for dependent in &dependents[next] {
            indegree[*dependent] -= 1;
        }
    }

    let mut seen = HashSet::new();
    for idx in &order {
        let stage = &stages[*idx];
        for task in &stage.tasks {
            for reference in task.context {
                if !seen.contains(reference.as_str()) {
                    errors.push(format!(
                        "task '{}' references '{}' which does not run before it",
                        task.id, reference
                    ));
                }
            }
            seen.insert(task.id);
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn orders_by_dependencies_then_declaration() {
        let synth_deps = strings(&["analyze"]);
        let analyze_deps = strings(&["investigate"]);
        let none: Vec<String> = Vec::new();
        let ctx = strings(&["industry"]);
        let stages = vec![
            StageOutline {
                name: "synthesize",
                depends_on: &synth_deps,
                tasks: vec![TaskOutline {
                    id: "synthesis",
                    context: &ctx,
                }],
            },
            StageOutline {
                name: "analyze",
                depends_on: &analyze_deps,
                tasks: Vec::new(),
            },
            StageOutline {
                name: "investigate",
                depends_on: &none,
                tasks: vec![TaskOutline {
                    id: "industry",
                    context: &none,
                }],
            },
        ];
        assert_eq!(stage_order(&stages), Ok(vec![2, 1, 0]));
    }

    #[test]
    fn reports_cycles() {
        let a_deps = strings(&["b"]);
        let b_deps = strings(&["a"]);
        let stages = vec![
            StageOutline {
                name: "a",
                depends_on: &a_deps,
                tasks: Vec::new(),
            },
            StageOutline {
                name: "b",
                depends_on: &b_deps,
                tasks: Vec::new(),
            },
        ];
        let errors = stage_order(&stages).expect_err("cycle");
        assert_eq!(errors, vec!["dependency cycle between stages: a, b"]);
    }

    #[test]
    fn reports_unknown_dependency_and_forward_reference() {
        let none: Vec<String> = Vec::new();
        let unknown = strings(&["missing"]);
        let stages = vec![StageOutline {
            name: "only",
            depends_on: &unknown,
            tasks: Vec::new(),
        }];
        assert_eq!(
            stage_order(&stages),
            Err(vec![
                "stage 'only' depends on unknown stage 'missing'".to_string()
            ])
        );

        let forward = strings(&["second"]);
        let stages = vec![StageOutline {
            name: "s",
            depends_on: &none,
            tasks: vec![
                TaskOutline {
                    id: "first",
                    context: &forward,
                },
                TaskOutline {
                    id: "second",
                    context: &none,
                },
            ],
        }];
        let errors = stage_order(&stages).expect_err("forward reference");
        assert!(errors[0].contains("'first' references 'second'"));
    }
}
