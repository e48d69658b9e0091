//! KeePass database operations wrapper.
//!
//! Thin layer over the `keepass` crate: opening with a composite key,
//! converting library nodes into API records, and the tree mutations the
//! vault layer builds on. Persistence to disk stays out of this module;
//! `serialize` produces the encrypted bytes and the caller owns the write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use keepass::db::{Entry as KpEntry, Group as KpGroup, Node, Times, Value};
use keepass::{Database, DatabaseKey};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::models::{DatabaseInfo, EntryRecord, GroupRecord};

const RECYCLE_BIN_NAME: &str = "Recycle Bin";
const RECYCLE_BIN_ICON: usize = 43;

/// Standard kdbx fields handled through dedicated getters.
const STANDARD_FIELDS: [&str; 5] = ["Title", "UserName", "Password", "URL", "Notes"];

/// Input shape for `create_entry`.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub expires: Option<NaiveDateTime>,
    pub icon: Option<usize>,
}

/// Partial update for `update_entry`; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub custom_fields: Option<BTreeMap<String, String>>,
    pub expires: Option<NaiveDateTime>,
    pub icon: Option<usize>,
}

/// Partial update for `update_group`.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub icon: Option<usize>,
}

/// Policy for deleting a non-empty group.
#[derive(Debug, Clone, Default)]
pub struct DeleteGroupPolicy {
    /// Delete even when the group still holds entries or subgroups;
    /// orphaned children are relocated to the recycle bin.
    pub force: bool,
    /// Relocate contained entries to this group before deleting.
    pub move_entries_to: Option<Uuid>,
}

/// Wrapper around an unlocked KeePass database.
pub struct KeepassDatabase {
    db: Database,
    path: PathBuf,
    key: DatabaseKey,
}

impl KeepassDatabase {
    /// Open and unlock a KeePass database with a password and optional key file.
    pub fn unlock(
        path: impl AsRef<Path>,
        password: &str,
        key_file: Option<&Path>,
    ) -> Result<Self> {
        let path = path.as_ref();

        let mut key = DatabaseKey::new().with_password(password);
        if let Some(key_file) = key_file {
            let mut reader = std::fs::File::open(key_file)
                .map_err(|_| VaultError::Database("key file is not readable".into()))?;
            key = key
                .with_keyfile(&mut reader)
                .map_err(|_| VaultError::Database("key file is not a valid KeePass key".into()))?;
        }

        let mut file = std::fs::File::open(path)
            .map_err(|_| VaultError::Database("database file is not readable".into()))?;

        // Wrong password and wrong key file both surface here; the detailed
        // cause is logged but only a generic credential failure leaves the
        // boundary.
        let db = Database::open(&mut file, key.clone()).map_err(|e| {
            tracing::debug!(error = %e, "database unlock failed");
            VaultError::Authentication
        })?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
            key,
        })
    }

    /// Path of the persisted database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen the on-disk file with the same composite key, discarding
    /// in-memory state. Used after a backup restore.
    pub fn reload(&self) -> Result<Self> {
        let mut file = std::fs::File::open(&self.path)
            .map_err(|_| VaultError::Database("database file is not readable".into()))?;
        let db = Database::open(&mut file, self.key.clone())
            .map_err(|e| VaultError::Database(format!("failed to reopen database: {e}")))?;
        Ok(Self {
            db,
            path: self.path.clone(),
            key: self.key.clone(),
        })
    }

    /// Encrypt the current in-memory state into kdbx bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.db
            .save(&mut buf, self.key.clone())
            .map_err(|e| VaultError::Database(format!("failed to serialize database: {e}")))?;
        Ok(buf)
    }

    /// Non-secret overview of the database.
    pub fn info(&self) -> DatabaseInfo {
        let entries = self.all_entries(false);
        DatabaseInfo {
            name: self.db.meta.database_name.clone(),
            description: self.db.meta.database_description.clone(),
            entry_count: entries.len(),
            group_count: self.list_groups().len(),
            locked: false,
            access_mode: crate::config::AccessMode::ReadOnly, // overwritten by the vault
        }
    }

    pub fn root_uuid(&self) -> Uuid {
        self.db.root.uuid
    }

    fn recycle_bin_uuid(&self) -> Option<Uuid> {
        self.db.meta.recyclebin_uuid.or_else(|| {
            self.db.root.children.iter().find_map(|node| match node {
                Node::Group(g) if g.name == RECYCLE_BIN_NAME => Some(g.uuid),
                _ => None,
            })
        })
    }

    /// Recycle bin uuid, creating and registering the group if missing.
    fn ensure_recycle_bin(&mut self) -> Uuid {
        if let Some(uuid) = self.recycle_bin_uuid() {
            return uuid;
        }
        let mut bin = KpGroup::new(RECYCLE_BIN_NAME);
        bin.icon_id = Some(RECYCLE_BIN_ICON);
        let uuid = bin.uuid;
        self.db.root.children.push(Node::Group(bin));
        self.db.meta.recyclebin_uuid = Some(uuid);
        self.db.meta.recyclebin_enabled = Some(true);
        uuid
    }

    // ── conversions ──────────────────────────────────────────────────────

    fn convert_entry(ke: &KpEntry, group: &KpGroup) -> EntryRecord {
        let mut custom_fields = BTreeMap::new();
        for (field, value) in &ke.fields {
            if STANDARD_FIELDS.contains(&field.as_str()) {
                continue;
            }
            match value {
                Value::Unprotected(s) => {
                    custom_fields.insert(field.clone(), s.clone());
                }
                Value::Protected(_) => {
                    if let Some(s) = ke.get(field) {
                        custom_fields.insert(field.clone(), s.to_string());
                    }
                }
                Value::Bytes(_) => {}
            }
        }

        EntryRecord {
            id: ke.uuid.to_string(),
            title: ke.get_title().unwrap_or_default().to_string(),
            username: ke.get_username().unwrap_or_default().to_string(),
            password: Some(ke.get_password().unwrap_or_default().to_string()),
            url: ke.get_url().unwrap_or_default().to_string(),
            notes: ke.get("Notes").unwrap_or_default().to_string(),
            tags: ke.tags.clone(),
            custom_fields,
            group: group.name.clone(),
            group_id: group.uuid.to_string(),
            created: ke.times.get_creation().cloned(),
            modified: ke.times.get_last_modification().cloned(),
            accessed: ke.times.get_last_access().cloned(),
            expires: if ke.times.expires {
                ke.times.get_expiry().cloned()
            } else {
                None
            },
            icon: ke.icon_id,
        }
    }

    fn convert_group(
        kg: &KpGroup,
        path: &str,
        parent: Option<Uuid>,
        recycle_bin: Option<Uuid>,
    ) -> GroupRecord {
        let entry_count = kg
            .children
            .iter()
            .filter(|n| matches!(n, Node::Entry(_)))
            .count();
        let subgroup_count = kg
            .children
            .iter()
            .filter(|n| matches!(n, Node::Group(_)))
            .count();
        GroupRecord {
            id: kg.uuid.to_string(),
            name: kg.name.clone(),
            notes: kg.notes.clone(),
            path: path.to_string(),
            parent_id: parent.map(|u| u.to_string()),
            entry_count,
            subgroup_count,
            is_recycle_bin: Some(kg.uuid) == recycle_bin,
        }
    }

    // ── read operations ──────────────────────────────────────────────────

    /// Every entry in the database with its owning group attached.
    ///
    /// Entries inside the recycle bin are part of the result only when
    /// `include_recycled` is set; they are otherwise outside the active set.
    pub fn all_entries(&self, include_recycled: bool) -> Vec<EntryRecord> {
        let recycle_bin = self.recycle_bin_uuid();
        let mut out = Vec::new();
        Self::walk_entries(&self.db.root, recycle_bin, include_recycled, &mut out);
        out
    }

    fn walk_entries(
        group: &KpGroup,
        recycle_bin: Option<Uuid>,
        include_recycled: bool,
        out: &mut Vec<EntryRecord>,
    ) {
        for node in &group.children {
            match node {
                Node::Entry(e) => out.push(Self::convert_entry(e, group)),
                Node::Group(g) => {
                    if !include_recycled && Some(g.uuid) == recycle_bin {
                        continue;
                    }
                    Self::walk_entries(g, recycle_bin, include_recycled, out);
                }
            }
        }
    }

    /// Entries directly in a group, optionally including all subgroups.
    pub fn entries_in_group(&self, group_id: Uuid, recursive: bool) -> Result<Vec<EntryRecord>> {
        let group = Self::find_group(&self.db.root, group_id)
            .ok_or_else(|| VaultError::GroupNotFound(group_id.to_string()))?;
        let mut out = Vec::new();
        if recursive {
            Self::walk_entries(group, None, true, &mut out);
        } else {
            for node in &group.children {
                if let Node::Entry(e) = node {
                    out.push(Self::convert_entry(e, group));
                }
            }
        }
        Ok(out)
    }

    /// Find an active entry by uuid. Recycled entries are not found.
    pub fn get_entry(&self, id: Uuid) -> Result<EntryRecord> {
        let recycle_bin = self.recycle_bin_uuid();
        Self::find_entry_in(&self.db.root, id, recycle_bin)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))
    }

    fn find_entry_in(
        group: &KpGroup,
        id: Uuid,
        recycle_bin: Option<Uuid>,
    ) -> Option<EntryRecord> {
        for node in &group.children {
            match node {
                Node::Entry(e) if e.uuid == id => {
                    return Some(Self::convert_entry(e, group));
                }
                Node::Group(g) => {
                    if Some(g.uuid) == recycle_bin {
                        continue;
                    }
                    if let Some(found) = Self::find_entry_in(g, id, recycle_bin) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// All groups as flat records, root first, with slash-joined paths.
    pub fn list_groups(&self) -> Vec<GroupRecord> {
        let recycle_bin = self.recycle_bin_uuid();
        let mut out = Vec::new();
        Self::walk_groups(&self.db.root, "", None, recycle_bin, &mut out);
        out
    }

    fn walk_groups(
        group: &KpGroup,
        parent_path: &str,
        parent: Option<Uuid>,
        recycle_bin: Option<Uuid>,
        out: &mut Vec<GroupRecord>,
    ) {
        let path = if parent_path.is_empty() {
            format!("/{}", group.name)
        } else {
            format!("{}/{}", parent_path, group.name)
        };
        out.push(Self::convert_group(group, &path, parent, recycle_bin));
        for node in &group.children {
            if let Node::Group(g) = node {
                Self::walk_groups(g, &path, Some(group.uuid), recycle_bin, out);
            }
        }
    }

    pub fn get_group(&self, id: Uuid) -> Result<GroupRecord> {
        self.list_groups()
            .into_iter()
            .find(|g| g.id == id.to_string())
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))
    }

    /// First group with the given name, depth-first from the root.
    pub fn find_group_by_name(&self, name: &str) -> Option<GroupRecord> {
        self.list_groups()
            .into_iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
    }

    // ── mutations ────────────────────────────────────────────────────────

    /// Create an entry inside the given group (root when `None`).
    pub fn create_entry(&mut self, group_id: Option<Uuid>, new: NewEntry) -> Result<EntryRecord> {
        let target = group_id.unwrap_or(self.db.root.uuid);

        let mut entry = KpEntry::new();
        entry
            .fields
            .insert("Title".into(), Value::Unprotected(new.title));
        entry
            .fields
            .insert("UserName".into(), Value::Unprotected(new.username));
        entry.fields.insert(
            "Password".into(),
            Value::Protected(new.password.as_bytes().into()),
        );
        entry.fields.insert("URL".into(), Value::Unprotected(new.url));
        entry
            .fields
            .insert("Notes".into(), Value::Unprotected(new.notes));
        for (k, v) in new.custom_fields {
            entry.fields.insert(k, Value::Unprotected(v));
        }
        entry.tags = new.tags;
        entry.icon_id = new.icon;
        if let Some(expiry) = new.expires {
            entry.times.expires = true;
            entry.times.times.insert("ExpiryTime".into(), expiry);
        }

        let id = entry.uuid;
        let group = Self::find_group_mut(&mut self.db.root, target)
            .ok_or_else(|| VaultError::GroupNotFound(target.to_string()))?;
        group.children.push(Node::Entry(entry));

        self.get_entry_anywhere(id)
    }

    /// Apply a partial update to an active entry and bump its mtime.
    pub fn update_entry(&mut self, id: Uuid, patch: EntryPatch) -> Result<EntryRecord> {
        // Membership in the active set is checked first so recycled
        // entries cannot be edited in place.
        self.get_entry(id)?;

        let entry = Self::find_entry_mut(&mut self.db.root, id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;

        if let Some(title) = patch.title {
            entry.fields.insert("Title".into(), Value::Unprotected(title));
        }
        if let Some(username) = patch.username {
            entry
                .fields
                .insert("UserName".into(), Value::Unprotected(username));
        }
        if let Some(password) = patch.password {
            entry.fields.insert(
                "Password".into(),
                Value::Protected(password.as_bytes().into()),
            );
        }
        if let Some(url) = patch.url {
            entry.fields.insert("URL".into(), Value::Unprotected(url));
        }
        if let Some(notes) = patch.notes {
            entry.fields.insert("Notes".into(), Value::Unprotected(notes));
        }
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }
        if let Some(custom_fields) = patch.custom_fields {
            entry
                .fields
                .retain(|k, _| STANDARD_FIELDS.contains(&k.as_str()));
            for (k, v) in custom_fields {
                entry.fields.insert(k, Value::Unprotected(v));
            }
        }
        if let Some(expiry) = patch.expires {
            entry.times.expires = true;
            entry.times.times.insert("ExpiryTime".into(), expiry);
        }
        if let Some(icon) = patch.icon {
            entry.icon_id = Some(icon);
        }
        entry
            .times
            .times
            .insert("LastModificationTime".into(), Times::now());

        self.get_entry(id)
    }

    /// Soft delete moves the entry into the recycle bin; permanent delete
    /// detaches it for good (and may target recycled entries).
    pub fn delete_entry(&mut self, id: Uuid, permanent: bool) -> Result<()> {
        if permanent {
            // may target recycled entries, but never groups
            self.get_entry_anywhere(id)?;
            let (node, _) = Self::detach_node(&mut self.db.root, id)
                .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
            debug_assert!(matches!(node, Node::Entry(_)));
            return Ok(());
        }

        // Soft delete only applies to the active set; a second call on the
        // same id fails rather than silently succeeding.
        self.get_entry(id)?;
        let bin = self.ensure_recycle_bin();
        let (node, _) = Self::detach_node(&mut self.db.root, id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
        let bin_group = Self::find_group_mut(&mut self.db.root, bin)
            .expect("recycle bin exists after ensure_recycle_bin");
        bin_group.children.push(node);
        Ok(())
    }

    /// Move an active entry to another group.
    pub fn move_entry(&mut self, id: Uuid, target_group: Uuid) -> Result<EntryRecord> {
        self.get_entry(id)?;
        if Self::find_group(&self.db.root, target_group).is_none() {
            return Err(VaultError::GroupNotFound(target_group.to_string()));
        }
        let (mut node, _) = Self::detach_node(&mut self.db.root, id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
        if let Node::Entry(e) = &mut node {
            e.times
                .times
                .insert("LocationChanged".into(), Times::now());
        }
        let group = Self::find_group_mut(&mut self.db.root, target_group)
            .ok_or_else(|| VaultError::GroupNotFound(target_group.to_string()))?;
        group.children.push(node);
        self.get_entry(id)
    }

    pub fn create_group(
        &mut self,
        parent: Option<Uuid>,
        name: &str,
        notes: Option<String>,
        icon: Option<usize>,
    ) -> Result<GroupRecord> {
        let parent = parent.unwrap_or(self.db.root.uuid);

        let parent_group = Self::find_group(&self.db.root, parent)
            .ok_or_else(|| VaultError::GroupNotFound(parent.to_string()))?;
        let sibling_exists = parent_group.children.iter().any(|n| {
            matches!(n, Node::Group(g) if g.name.eq_ignore_ascii_case(name))
        });
        if sibling_exists {
            return Err(VaultError::Validation(format!(
                "group '{name}' already exists in the target parent"
            )));
        }

        let mut group = KpGroup::new(name);
        group.notes = notes;
        group.icon_id = icon;
        let id = group.uuid;

        let parent_group = Self::find_group_mut(&mut self.db.root, parent)
            .ok_or_else(|| VaultError::GroupNotFound(parent.to_string()))?;
        parent_group.children.push(Node::Group(group));

        self.get_group(id)
    }

    pub fn update_group(&mut self, id: Uuid, patch: GroupPatch) -> Result<GroupRecord> {
        if id == self.db.root.uuid {
            return Err(VaultError::Validation(
                "the root group cannot be modified".into(),
            ));
        }
        let group = Self::find_group_mut(&mut self.db.root, id)
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))?;
        if let Some(name) = patch.name {
            group.name = name;
        }
        if let Some(notes) = patch.notes {
            group.notes = Some(notes);
        }
        if let Some(icon) = patch.icon {
            group.icon_id = Some(icon);
        }
        group
            .times
            .times
            .insert("LastModificationTime".into(), Times::now());
        self.get_group(id)
    }

    /// Delete a group. Non-empty groups are rejected unless the policy
    /// says otherwise; orphaned children go to the recycle bin.
    pub fn delete_group(&mut self, id: Uuid, policy: DeleteGroupPolicy) -> Result<()> {
        if id == self.db.root.uuid {
            return Err(VaultError::Validation(
                "the root group cannot be deleted".into(),
            ));
        }
        let group = Self::find_group(&self.db.root, id)
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))?;
        let is_empty = group.children.is_empty();

        if !is_empty {
            if let Some(target) = policy.move_entries_to {
                if target == id || Self::is_descendant(group, target) {
                    return Err(VaultError::Validation(
                        "entries cannot be relocated into the group being deleted".into(),
                    ));
                }
                if Self::find_group(&self.db.root, target).is_none() {
                    return Err(VaultError::GroupNotFound(target.to_string()));
                }
                let entry_ids: Vec<Uuid> = self
                    .entries_in_group(id, true)?
                    .iter()
                    .filter_map(|e| Uuid::parse_str(&e.id).ok())
                    .collect();
                for entry_id in entry_ids {
                    self.move_entry(entry_id, target)?;
                }
            } else if !policy.force {
                return Err(VaultError::Validation(
                    "group is not empty; pass force=true or a move_entries_to target".into(),
                ));
            }
        }

        let bin = self.ensure_recycle_bin();
        let (node, _) = Self::detach_node(&mut self.db.root, id)
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))?;

        // Forced deletion keeps the subtree recoverable in the recycle bin;
        // after a relocation only the (now empty or subgroup-only) shell
        // lands there.
        if id != bin {
            let bin_group = Self::find_group_mut(&mut self.db.root, bin)
                .expect("recycle bin exists after ensure_recycle_bin");
            bin_group.children.push(node);
        }
        Ok(())
    }

    /// Re-parent a group. Moving a group under its own subtree is rejected.
    pub fn move_group(&mut self, id: Uuid, new_parent: Uuid) -> Result<GroupRecord> {
        if id == self.db.root.uuid {
            return Err(VaultError::Validation("the root group cannot be moved".into()));
        }
        let group = Self::find_group(&self.db.root, id)
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))?;
        if id == new_parent || Self::is_descendant(group, new_parent) {
            return Err(VaultError::Validation(
                "a group cannot be moved into its own subtree".into(),
            ));
        }
        if Self::find_group(&self.db.root, new_parent).is_none() {
            return Err(VaultError::GroupNotFound(new_parent.to_string()));
        }

        let (mut node, _) = Self::detach_node(&mut self.db.root, id)
            .ok_or_else(|| VaultError::GroupNotFound(id.to_string()))?;
        if let Node::Group(g) = &mut node {
            g.times.times.insert("LocationChanged".into(), Times::now());
        }
        let parent = Self::find_group_mut(&mut self.db.root, new_parent)
            .ok_or_else(|| VaultError::GroupNotFound(new_parent.to_string()))?;
        parent.children.push(node);
        self.get_group(id)
    }

    // ── tree helpers ─────────────────────────────────────────────────────

    fn get_entry_anywhere(&self, id: Uuid) -> Result<EntryRecord> {
        Self::find_entry_in(&self.db.root, id, None)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))
    }

    fn find_group(group: &KpGroup, id: Uuid) -> Option<&KpGroup> {
        if group.uuid == id {
            return Some(group);
        }
        group.children.iter().find_map(|node| match node {
            Node::Group(g) => Self::find_group(g, id),
            _ => None,
        })
    }

    fn find_group_mut(group: &mut KpGroup, id: Uuid) -> Option<&mut KpGroup> {
        if group.uuid == id {
            return Some(group);
        }
        group.children.iter_mut().find_map(|node| match node {
            Node::Group(g) => Self::find_group_mut(g, id),
            _ => None,
        })
    }

    fn find_entry_mut(group: &mut KpGroup, id: Uuid) -> Option<&mut KpEntry> {
        for node in &mut group.children {
            match node {
                Node::Entry(e) if e.uuid == id => return Some(e),
                Node::Group(g) => {
                    if let Some(found) = Self::find_entry_mut(g, id) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Remove the node (entry or group) with the given uuid from the tree,
    /// returning it together with its former parent uuid.
    fn detach_node(group: &mut KpGroup, id: Uuid) -> Option<(Node, Uuid)> {
        let position = group.children.iter().position(|node| match node {
            Node::Entry(e) => e.uuid == id,
            Node::Group(g) => g.uuid == id,
        });
        if let Some(index) = position {
            let parent = group.uuid;
            return Some((group.children.remove(index), parent));
        }
        for node in &mut group.children {
            if let Node::Group(g) = node {
                if let Some(found) = Self::detach_node(g, id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Whether `id` names a strict descendant of `group`.
    fn is_descendant(group: &KpGroup, id: Uuid) -> bool {
        group.children.iter().any(|node| match node {
            Node::Group(g) => g.uuid == id || Self::is_descendant(g, id),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepass::config::DatabaseConfig;

    /// In-memory database with no disk round trip; tree operations do not
    /// need the crypto path.
    fn test_db() -> KeepassDatabase {
        let db = Database::new(DatabaseConfig::default());
        KeepassDatabase {
            db,
            path: PathBuf::from("/tmp/test.kdbx"),
            key: DatabaseKey::new().with_password("password"),
        }
    }

    fn sample_entry(title: &str) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            username: "alice".into(),
            password: "hunter2!".into(),
            url: "https://example.com".into(),
            notes: "a note".into(),
            tags: vec!["work".into()],
            ..Default::default()
        }
    }

    #[test]
    fn create_then_get_round_trips_fields() {
        let mut db = test_db();
        let created = db.create_entry(None, sample_entry("VPN")).unwrap();
        let id = Uuid::parse_str(&created.id).unwrap();

        let fetched = db.get_entry(id).unwrap();
        assert_eq!(fetched.title, "VPN");
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.password.as_deref(), Some("hunter2!"));
        assert_eq!(fetched.url, "https://example.com");
        assert_eq!(fetched.tags, vec!["work".to_string()]);
        assert!(fetched.created.is_some());
    }

    #[test]
    fn update_entry_is_partial() {
        let mut db = test_db();
        let created = db.create_entry(None, sample_entry("Mail")).unwrap();
        let id = Uuid::parse_str(&created.id).unwrap();

        let patch = EntryPatch {
            username: Some("bob".into()),
            ..Default::default()
        };
        let updated = db.update_entry(id, patch).unwrap();
        assert_eq!(updated.username, "bob");
        // untouched fields survive
        assert_eq!(updated.title, "Mail");
        assert_eq!(updated.password.as_deref(), Some("hunter2!"));
    }

    #[test]
    fn soft_delete_moves_out_of_active_set() {
        let mut db = test_db();
        let created = db.create_entry(None, sample_entry("Old")).unwrap();
        let id = Uuid::parse_str(&created.id).unwrap();

        db.delete_entry(id, false).unwrap();
        assert!(matches!(db.get_entry(id), Err(VaultError::EntryNotFound(_))));

        // second soft delete fails instead of silently succeeding
        assert!(matches!(
            db.delete_entry(id, false),
            Err(VaultError::EntryNotFound(_))
        ));

        // still present when recycled entries are included
        assert!(db.all_entries(true).iter().any(|e| e.id == created.id));
        // a permanent delete can still purge it
        db.delete_entry(id, true).unwrap();
        assert!(!db.all_entries(true).iter().any(|e| e.id == created.id));
    }

    #[test]
    fn permanent_delete_rejects_group_ids() {
        let mut db = test_db();
        let work = db.create_group(None, "Work", None, None).unwrap();
        let work_id = Uuid::parse_str(&work.id).unwrap();
        db.create_entry(Some(work_id), sample_entry("VPN")).unwrap();

        // a group uuid is not an entry; the subtree must survive intact
        assert!(matches!(
            db.delete_entry(work_id, true),
            Err(VaultError::EntryNotFound(_))
        ));
        assert!(db.get_group(work_id).is_ok());
        assert_eq!(db.entries_in_group(work_id, false).unwrap().len(), 1);

        // same for the soft path
        assert!(matches!(
            db.delete_entry(work_id, false),
            Err(VaultError::EntryNotFound(_))
        ));
        assert!(db.get_group(work_id).is_ok());
    }

    #[test]
    fn move_entry_between_groups() {
        let mut db = test_db();
        let work = db.create_group(None, "Work", None, None).unwrap();
        let infra = db.create_group(None, "Infra", None, None).unwrap();
        let work_id = Uuid::parse_str(&work.id).unwrap();
        let infra_id = Uuid::parse_str(&infra.id).unwrap();

        let entry = db
            .create_entry(Some(work_id), sample_entry("VPN"))
            .unwrap();
        let entry_id = Uuid::parse_str(&entry.id).unwrap();

        db.move_entry(entry_id, infra_id).unwrap();

        assert!(db.entries_in_group(work_id, false).unwrap().is_empty());
        let infra_entries = db.entries_in_group(infra_id, false).unwrap();
        assert_eq!(infra_entries.len(), 1);
        assert_eq!(infra_entries[0].title, "VPN");
    }

    #[test]
    fn delete_nonempty_group_requires_policy() {
        let mut db = test_db();
        let work = db.create_group(None, "Work", None, None).unwrap();
        let work_id = Uuid::parse_str(&work.id).unwrap();
        db.create_entry(Some(work_id), sample_entry("VPN")).unwrap();

        let err = db.delete_group(work_id, DeleteGroupPolicy::default());
        assert!(matches!(err, Err(VaultError::Validation(_))));

        db.delete_group(
            work_id,
            DeleteGroupPolicy {
                force: true,
                move_entries_to: None,
            },
        )
        .unwrap();
        // subtree ends up in the recycle bin, outside the active set
        assert!(db.all_entries(false).is_empty());
        assert!(db.all_entries(true).iter().any(|e| e.title == "VPN"));
    }

    #[test]
    fn delete_group_can_relocate_entries() {
        let mut db = test_db();
        let work = db.create_group(None, "Work", None, None).unwrap();
        let archive = db.create_group(None, "Archive", None, None).unwrap();
        let work_id = Uuid::parse_str(&work.id).unwrap();
        let archive_id = Uuid::parse_str(&archive.id).unwrap();
        db.create_entry(Some(work_id), sample_entry("VPN")).unwrap();

        db.delete_group(
            work_id,
            DeleteGroupPolicy {
                force: false,
                move_entries_to: Some(archive_id),
            },
        )
        .unwrap();

        let archived = db.entries_in_group(archive_id, false).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].title, "VPN");
    }

    #[test]
    fn move_group_rejects_cycles() {
        let mut db = test_db();
        let outer = db.create_group(None, "Outer", None, None).unwrap();
        let outer_id = Uuid::parse_str(&outer.id).unwrap();
        let inner = db
            .create_group(Some(outer_id), "Inner", None, None)
            .unwrap();
        let inner_id = Uuid::parse_str(&inner.id).unwrap();

        let err = db.move_group(outer_id, inner_id);
        assert!(matches!(err, Err(VaultError::Validation(_))));

        // the legal direction still works
        let top = db.create_group(None, "Top", None, None).unwrap();
        let top_id = Uuid::parse_str(&top.id).unwrap();
        let moved = db.move_group(inner_id, top_id).unwrap();
        assert_eq!(moved.parent_id, Some(top.id));
    }

    #[test]
    fn duplicate_sibling_group_names_rejected() {
        let mut db = test_db();
        db.create_group(None, "Work", None, None).unwrap();
        assert!(matches!(
            db.create_group(None, "work", None, None),
            Err(VaultError::Validation(_))
        ));
    }
}
