//! Shared fixtures for dirx-transfer integration tests.

#![allow(dead_code)]

use dirx_core::memory::{MemoryDirectory, MemoryOptions};
use dirx_core::{Object, Record, Relation};
use dirx_transfer::ProgressCounter;

pub const USERS: usize = 25;
pub const GROUPS: usize = 3;

/// A directory of users, groups, and memberships (every user in one group,
/// every group nested in the first).
pub fn seeded(options: MemoryOptions) -> MemoryDirectory {
    let dir = MemoryDirectory::with_options(options);
    for g in 0..GROUPS {
        let mut group = Object::new("group", format!("g{g}"));
        group.display_name = format!("Group {g}");
        dir.insert_object(group);
        if g > 0 {
            dir.insert_relation(
                Relation::new(("group", "g0"), "member", ("group", format!("g{g}").as_str()))
                    .with_subject_relation("member"),
            );
        }
    }
    for u in 0..USERS {
        let mut user = Object::new("user", format!("u{u:02}"));
        user.properties
            .insert("email".into(), format!("u{u}@example.com").into());
        dir.insert_object(user);
        dir.insert_relation(Relation::new(
            ("group", format!("g{}", u % GROUPS).as_str()),
            "member",
            ("user", format!("u{u:02}").as_str()),
        ));
    }
    dir
}

pub fn relation_count() -> usize {
    USERS + GROUPS - 1
}

/// Records with server-assigned fields cleared, for comparing across
/// directories.
pub fn stripped<T: Record>(records: Vec<T>) -> Vec<T> {
    records
        .into_iter()
        .map(|mut r| {
            r.strip_server_fields();
            r
        })
        .collect()
}

pub fn quiet() -> ProgressCounter {
    ProgressCounter::hidden("test")
}
