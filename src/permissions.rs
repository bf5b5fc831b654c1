//! Access resolution for a single user on a single task.
//!
//! Everything that mutates a task asks this module first. The database
//! layer uses the same rules as SQL predicates when filtering lists.

use serde::Serialize;

use crate::types::{SharePermission, Task, TaskShare};

/// Effective access a user holds on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Owner,
    Edit,
    View,
    None,
}

impl Permission {
    pub fn can_view(&self) -> bool {
        !matches!(self, Permission::None)
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, Permission::Owner | Permission::Edit)
    }

    /// Status toggling rides on edit rights.
    pub fn can_toggle_status(&self) -> bool {
        self.can_edit()
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, Permission::Owner)
    }

    pub fn can_share(&self) -> bool {
        matches!(self, Permission::Owner)
    }
}

impl From<SharePermission> for Permission {
    fn from(p: SharePermission) -> Self {
        match p {
            SharePermission::View => Permission::View,
            SharePermission::Edit => Permission::Edit,
        }
    }
}

/// Owner wins over any share; otherwise the user's share grant decides.
pub fn resolve_permission(task: &Task, shares: &[TaskShare], user_id: &str) -> Permission {
    if task.owner_id == user_id {
        return Permission::Owner;
    }
    shares
        .iter()
        .find(|s| s.task_id == task.id && s.user_id == user_id)
        .map(|s| Permission::from(s.permission))
        .unwrap_or(Permission::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskPriority, TaskStatus};
    use chrono::Utc;

    fn task(owner: &str) -> Task {
        let now = Utc::now();
        Task {
            id: 1,
            title: "Write report".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            due_date: None,
            completed_at: None,
            owner_id: owner.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn share(task_id: i64, user: &str, permission: SharePermission) -> TaskShare {
        TaskShare {
            id: 1,
            task_id,
            user_id: user.to_string(),
            permission,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn owner_has_full_rights() {
        let p = resolve_permission(&task("alice"), &[], "alice");
        assert_eq!(p, Permission::Owner);
        assert!(p.can_edit() && p.can_delete() && p.can_share());
    }

    #[test]
    fn edit_share_allows_edit_but_not_delete_or_share() {
        let shares = [share(1, "bob", SharePermission::Edit)];
        let p = resolve_permission(&task("alice"), &shares, "bob");
        assert_eq!(p, Permission::Edit);
        assert!(p.can_edit());
        assert!(p.can_toggle_status());
        assert!(!p.can_delete());
        assert!(!p.can_share());
    }

    #[test]
    fn view_share_is_read_only() {
        let shares = [share(1, "bob", SharePermission::View)];
        let p = resolve_permission(&task("alice"), &shares, "bob");
        assert_eq!(p, Permission::View);
        assert!(p.can_view());
        assert!(!p.can_edit());
    }

    #[test]
    fn stranger_has_no_access() {
        let shares = [share(1, "bob", SharePermission::Edit)];
        let p = resolve_permission(&task("alice"), &shares, "carol");
        assert_eq!(p, Permission::None);
        assert!(!p.can_view());
    }

    #[test]
    fn shares_for_other_tasks_are_ignored() {
        let shares = [share(2, "bob", SharePermission::Edit)];
        assert_eq!(
            resolve_permission(&task("alice"), &shares, "bob"),
            Permission::None
        );
    }

    #[test]
    fn owner_beats_stray_share_row() {
        let shares = [share(1, "alice", SharePermission::View)];
        assert_eq!(
            resolve_permission(&task("alice"), &shares, "alice"),
            Permission::Owner
        );
    }
}
