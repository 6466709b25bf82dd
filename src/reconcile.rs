//! Diffs two snapshots into the registry mutations that converge one to the other.
//!
//! Both passes read `previous` and `current` immutably, so the deletion pass
//! never observes anything the addition pass decides.  The output lists every
//! deletion before any addition.
//!
//! Key shapes, relative to the cluster prefix:
//!
//! * `{service}` tree, removed when a service disappears
//! * `{service}/endpoint`, written when a service first appears
//! * `{service}/{old-endpoint}`, removed when the endpoint of a surviving
//!   service changes
//! * `{service}/instances/{task-id}`, one per task, valued `"{ip}:{host-port}"`

use crate::types::{Mutation, Service, Snapshot};

/// Computes the full, ordered mutation list for one cycle.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<Mutation> {
    let mut mutations = deletions(previous, current);
    mutations.extend(additions(previous, current));
    mutations
}

/// Keys and trees present in `previous` that `current` no longer backs.
pub fn deletions(previous: &Snapshot, current: &Snapshot) -> Vec<Mutation> {
    let mut mutations = Vec::new();

    for (key, old) in previous {
        let Some(new) = current.get(key) else {
            mutations.push(Mutation::delete_tree(key.as_str()));
            continue;
        };

        if old.endpoint != new.endpoint {
            mutations.push(Mutation::delete_key(format!("{}/{}", key, old.endpoint)));
        }

        for task in old.tasks.iter().filter(|task| !new.contains(task)) {
            mutations.push(Mutation::delete_key(instance_key(key, &task.task_id)));
        }
    }

    mutations
}

/// Keys `current` needs that `previous` did not already hold.
pub fn additions(previous: &Snapshot, current: &Snapshot) -> Vec<Mutation> {
    let empty = Service::default();
    let mut mutations = Vec::new();

    for (key, new) in current {
        let old = match previous.get(key) {
            Some(old) => old,
            None => {
                mutations.push(Mutation::add_key(
                    format!("{}/endpoint", key),
                    new.endpoint.as_str(),
                ));
                &empty
            }
        };

        for task in new.tasks.iter().filter(|task| !old.contains(task)) {
            mutations.push(Mutation::add_key(
                instance_key(key, &task.task_id),
                task.address(),
            ));
        }
    }

    mutations
}

fn instance_key(service_key: &str, task_id: &str) -> String {
    format!("{}/instances/{}", service_key, task_id)
}
