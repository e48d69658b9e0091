// MCP server over the vault.
//
// Uses the rmcp crate (official Rust MCP SDK) to expose every vault
// operation as a discoverable tool. Successful calls return pretty-printed
// JSON; vault errors come back as a structured error payload with a
// machine-readable kind, so callers can react without parsing prose.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::*;
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Deserialize;

use kpvault_core::database::{DeleteGroupPolicy, EntryPatch, GroupPatch, NewEntry};
use kpvault_core::generator::PasswordSpec;
use kpvault_core::search::{SearchField, SearchOptions};
use kpvault_core::{Vault, VaultError};

// ─── Tool Parameter Types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AuthenticateParams {
    /// Master password for the KeePass database
    pub password: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SessionParams {
    /// Session token returned by authenticate
    pub token: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListEntriesParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Group UUID to list; all groups when omitted
    #[serde(default)]
    pub group_id: Option<String>,
    /// Include entries from subgroups
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetCredentialParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Entry UUID
    pub id: String,
    /// Include the password in the response
    #[serde(default)]
    pub include_password: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GroupInfoParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Group UUID, or a group name to look up
    pub group: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Free-text query; an empty query matches everything
    pub query: String,
    /// Restrict matching to these fields: title, username, url, notes, tags
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Whole-field equality instead of substring/fuzzy matching
    #[serde(default)]
    pub exact: bool,
    /// Only entries carrying all of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Maximum number of results
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchByUrlParams {
    /// Session token returned by authenticate
    pub token: String,
    /// URL or domain to match against entry URLs
    pub url: String,
    /// Also return subdomain and token-overlap matches
    #[serde(default = "default_true")]
    pub fuzzy: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WeakPasswordParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Passwords shorter than this are flagged
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Also flag passwords with fewer than three character classes
    #[serde(default = "default_true")]
    pub require_complexity: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GeneratePasswordParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Password length, 4 to 128
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default = "default_true")]
    pub uppercase: bool,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_true")]
    pub digits: bool,
    #[serde(default = "default_true")]
    pub symbols: bool,
    #[serde(default = "default_one")]
    pub min_uppercase: usize,
    #[serde(default = "default_one")]
    pub min_lowercase: usize,
    #[serde(default = "default_one")]
    pub min_digits: usize,
    #[serde(default = "default_one")]
    pub min_symbols: usize,
    /// Drop look-alike characters (0O1lI|)
    #[serde(default)]
    pub exclude_ambiguous: bool,
    /// Replaces the default symbol set when non-empty
    #[serde(default)]
    pub custom_symbols: String,
    /// Characters excluded from every class
    #[serde(default)]
    pub forbidden: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateEntryParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Target group UUID; the root group when omitted
    #[serde(default)]
    pub group_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Generate the password server-side when none is supplied
    #[serde(default)]
    pub generate: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    /// Expiry time, `YYYY-MM-DDTHH:MM:SS`
    #[serde(default)]
    pub expires: Option<String>,
    /// KeePass icon index
    #[serde(default)]
    pub icon: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateEntryParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Entry UUID
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Replaces all custom fields when present
    #[serde(default)]
    pub custom_fields: Option<BTreeMap<String, String>>,
    /// Expiry time, `YYYY-MM-DDTHH:MM:SS`
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub icon: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteEntryParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Entry UUID
    pub id: String,
    /// Skip the recycle bin and delete permanently
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MoveEntryParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Entry UUID
    pub id: String,
    /// Destination group UUID
    pub group_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EntryIdParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Entry UUID
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateGroupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Parent group UUID; the root group when omitted
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// KeePass icon index
    #[serde(default)]
    pub icon: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateGroupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Group UUID
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub icon: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteGroupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Group UUID
    pub id: String,
    /// Delete even when the group still has children; they go to the recycle bin
    #[serde(default)]
    pub force: bool,
    /// Relocate contained entries to this group UUID before deleting
    #[serde(default)]
    pub move_entries_to: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MoveGroupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Group UUID
    pub id: String,
    /// New parent group UUID
    pub parent_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateBackupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Gzip-compress the backup file
    #[serde(default = "default_true")]
    pub compress: bool,
    /// Verify the written backup against its checksum
    #[serde(default = "default_true")]
    pub verify: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RestoreBackupParams {
    /// Session token returned by authenticate
    pub token: String,
    /// Backup filename as returned by list_backups
    pub filename: String,
}

fn default_true() -> bool {
    true
}

fn default_min_length() -> usize {
    8
}

fn default_length() -> usize {
    16
}

fn default_one() -> usize {
    1
}

// ─── Server State ────────────────────────────────────────────────────────────

/// The MCP server exposing vault operations as tools.
#[derive(Clone)]
pub struct VaultServer {
    vault: Arc<Vault>,
    tool_router: ToolRouter<Self>,
}

impl VaultServer {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self {
            vault,
            tool_router: Self::tool_router(),
        }
    }
}

/// Wrap a serializable payload as a successful tool result.
fn success<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Map a vault error to a structured tool error payload.
fn failure(e: VaultError) -> Result<CallToolResult, McpError> {
    let body = serde_json::json!({
        "error": e.kind(),
        "message": e.to_string(),
    });
    Ok(CallToolResult::error(vec![Content::text(body.to_string())]))
}

fn respond<T: serde::Serialize>(
    outcome: Result<T, VaultError>,
) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(value) => success(&value),
        Err(e) => failure(e),
    }
}

fn parse_fields(raw: &[String]) -> Result<Vec<SearchField>, VaultError> {
    raw.iter()
        .map(|f| match f.to_lowercase().as_str() {
            "title" => Ok(SearchField::Title),
            "username" => Ok(SearchField::Username),
            "url" => Ok(SearchField::Url),
            "notes" => Ok(SearchField::Notes),
            "tags" => Ok(SearchField::Tags),
            other => Err(VaultError::Validation(format!(
                "unknown search field: '{other}'"
            ))),
        })
        .collect()
}

fn parse_expiry(raw: Option<String>) -> Result<Option<NaiveDateTime>, VaultError> {
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S").map_err(|_| {
            VaultError::Validation(format!(
                "invalid expiry '{s}', expected YYYY-MM-DDTHH:MM:SS"
            ))
        })
    })
    .transpose()
}

// ─── Tool Definitions ────────────────────────────────────────────────────────

#[tool_router]
impl VaultServer {
    #[tool(
        description = "Unlock the KeePass database with the master password and open a session. Returns a session token required by every other tool."
    )]
    async fn authenticate(
        &self,
        params: Parameters<AuthenticateParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.authenticate(&params.0.password).await)
    }

    #[tool(description = "Close the session and lock the database")]
    async fn logout(&self, params: Parameters<SessionParams>) -> Result<CallToolResult, McpError> {
        respond(
            self.vault
                .logout(&params.0.token)
                .await
                .map(|_| serde_json::json!({ "status": "logged_out" })),
        )
    }

    #[tool(description = "Server liveness probe; requires no session")]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        success(&self.vault.health_check().await)
    }

    #[tool(description = "Non-secret overview of the database: name, counts, access mode")]
    async fn get_database_info(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.get_database_info(&params.0.token).await)
    }

    #[tool(description = "List entries (passwords redacted), optionally scoped to one group")]
    async fn list_entries(
        &self,
        params: Parameters<ListEntriesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .list_entries(&p.token, p.group_id.as_deref(), p.recursive)
                .await,
        )
    }

    #[tool(
        description = "Fetch one entry by UUID. The password is only included when include_password is true."
    )]
    async fn get_credential(
        &self,
        params: Parameters<GetCredentialParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .get_credential(&p.token, &p.id, p.include_password)
                .await,
        )
    }

    #[tool(description = "List all groups with their paths and child counts")]
    async fn list_groups(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.list_groups(&params.0.token).await)
    }

    #[tool(description = "Look up a group by UUID or by name")]
    async fn get_group_info(
        &self,
        params: Parameters<GroupInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.get_group_info(&p.token, &p.group).await)
    }

    #[tool(
        description = "Field-weighted text search over entries. Results are scored and sorted best-first; passwords are never included."
    )]
    async fn search_credentials(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let fields = match parse_fields(&p.fields) {
            Ok(fields) => fields,
            Err(e) => return failure(e),
        };
        let opts = SearchOptions {
            fields,
            case_sensitive: p.case_sensitive,
            exact: p.exact,
            tags: p.tags,
            limit: p.limit,
        };
        respond(
            self.vault
                .search_credentials(&p.token, &p.query, &opts)
                .await,
        )
    }

    #[tool(
        description = "Find entries matching a URL, ranked by precision: exact URL, then domain, then subdomain and partial matches."
    )]
    async fn search_by_url(
        &self,
        params: Parameters<SearchByUrlParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.search_by_url(&p.token, &p.url, p.fuzzy).await)
    }

    #[tool(description = "Scan for entries with weak passwords and report why each was flagged")]
    async fn search_weak_passwords(
        &self,
        params: Parameters<WeakPasswordParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .search_weak_passwords(&p.token, p.min_length, p.require_complexity)
                .await,
        )
    }

    #[tool(description = "Group entries sharing the same title, username, and URL")]
    async fn search_duplicates(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.search_duplicates(&params.0.token).await)
    }

    #[tool(
        description = "Full hygiene report: weak, empty, and duplicate passwords, missing URLs, expired entries"
    )]
    async fn validate_entries(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.validate_entries(&params.0.token).await)
    }

    #[tool(
        description = "Generate a random password with guaranteed per-class minimums, plus a strength analysis"
    )]
    async fn generate_password(
        &self,
        params: Parameters<GeneratePasswordParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let spec = PasswordSpec {
            length: p.length,
            uppercase: p.uppercase,
            lowercase: p.lowercase,
            digits: p.digits,
            symbols: p.symbols,
            min_uppercase: p.min_uppercase,
            min_lowercase: p.min_lowercase,
            min_digits: p.min_digits,
            min_symbols: p.min_symbols,
            exclude_ambiguous: p.exclude_ambiguous,
            custom_symbols: p.custom_symbols,
            forbidden: p.forbidden,
        };
        respond(self.vault.generate_password(&p.token, &spec).await)
    }

    #[tool(description = "Create a new credential entry (requires a readwrite session)")]
    async fn create_entry(
        &self,
        params: Parameters<CreateEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let expires = match parse_expiry(p.expires) {
            Ok(expires) => expires,
            Err(e) => return failure(e),
        };
        let password = if p.generate && p.password.is_empty() {
            match self
                .vault
                .generate_password(&p.token, &PasswordSpec::default())
                .await
            {
                Ok(generated) => generated.password,
                Err(e) => return failure(e),
            }
        } else {
            p.password
        };
        let new = NewEntry {
            title: p.title,
            username: p.username,
            password,
            url: p.url,
            notes: p.notes,
            tags: p.tags,
            custom_fields: p.custom_fields,
            expires,
            icon: p.icon,
        };
        respond(
            self.vault
                .create_entry(&p.token, p.group_id.as_deref(), new)
                .await,
        )
    }

    #[tool(description = "Partially update an entry; omitted fields are left untouched")]
    async fn update_entry(
        &self,
        params: Parameters<UpdateEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let expires = match parse_expiry(p.expires) {
            Ok(expires) => expires,
            Err(e) => return failure(e),
        };
        let patch = EntryPatch {
            title: p.title,
            username: p.username,
            password: p.password,
            url: p.url,
            notes: p.notes,
            tags: p.tags,
            custom_fields: p.custom_fields,
            expires,
            icon: p.icon,
        };
        respond(self.vault.update_entry(&p.token, &p.id, patch).await)
    }

    #[tool(
        description = "Delete an entry. Goes to the recycle bin unless permanent is true."
    )]
    async fn delete_entry(
        &self,
        params: Parameters<DeleteEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .delete_entry(&p.token, &p.id, p.permanent)
                .await
                .map(|_| serde_json::json!({ "status": "deleted", "id": p.id })),
        )
    }

    #[tool(description = "Move an entry to another group")]
    async fn move_entry(
        &self,
        params: Parameters<MoveEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.move_entry(&p.token, &p.id, &p.group_id).await)
    }

    #[tool(description = "Copy an entry in place; the copy gets a ' (Copy)' title suffix")]
    async fn duplicate_entry(
        &self,
        params: Parameters<EntryIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.duplicate_entry(&p.token, &p.id).await)
    }

    #[tool(description = "Create a group under the given parent (root when omitted)")]
    async fn create_group(
        &self,
        params: Parameters<CreateGroupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .create_group(&p.token, p.parent_id.as_deref(), &p.name, p.notes, p.icon)
                .await,
        )
    }

    #[tool(description = "Rename a group or update its notes and icon")]
    async fn update_group(
        &self,
        params: Parameters<UpdateGroupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let patch = GroupPatch {
            name: p.name,
            notes: p.notes,
            icon: p.icon,
        };
        respond(self.vault.update_group(&p.token, &p.id, patch).await)
    }

    #[tool(
        description = "Delete a group. Non-empty groups need force=true or a move_entries_to target."
    )]
    async fn delete_group(
        &self,
        params: Parameters<DeleteGroupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let move_entries_to = match p
            .move_entries_to
            .as_deref()
            .map(|raw| {
                uuid::Uuid::parse_str(raw).map_err(|_| {
                    VaultError::Validation(format!("invalid id: '{raw}'"))
                })
            })
            .transpose()
        {
            Ok(target) => target,
            Err(e) => return failure(e),
        };
        let policy = DeleteGroupPolicy {
            force: p.force,
            move_entries_to,
        };
        respond(
            self.vault
                .delete_group(&p.token, &p.id, policy)
                .await
                .map(|_| serde_json::json!({ "status": "deleted", "id": p.id })),
        )
    }

    #[tool(description = "Re-parent a group; moving into its own subtree is rejected")]
    async fn move_group(
        &self,
        params: Parameters<MoveGroupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.move_group(&p.token, &p.id, &p.parent_id).await)
    }

    #[tool(description = "Force a save of the in-memory database state to disk")]
    async fn save_database(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.vault
                .save_database(&params.0.token)
                .await
                .map(|_| serde_json::json!({ "status": "saved" })),
        )
    }

    #[tool(description = "Create a checksummed backup of the database file")]
    async fn create_backup(
        &self,
        params: Parameters<CreateBackupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(
            self.vault
                .create_backup(&p.token, p.compress, p.verify)
                .await,
        )
    }

    #[tool(description = "List existing backups, newest first")]
    async fn list_backups(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.vault.list_backups(&params.0.token).await)
    }

    #[tool(
        description = "Replace the database with a verified backup. The current state is snapshotted first."
    )]
    async fn restore_backup(
        &self,
        params: Parameters<RestoreBackupParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.vault.restore_backup(&p.token, &p.filename).await)
    }
}

// ─── ServerHandler ───────────────────────────────────────────────────────────

#[tool_handler]
impl ServerHandler for VaultServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "kpvault — KeePass credential vault for AI assistants. \
                 Call authenticate with the master password to get a session \
                 token, then pass that token to every other tool. Passwords \
                 are redacted unless explicitly requested."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use keepass::config::DatabaseConfig;
    use keepass::db::{Entry, Node, Value};
    use keepass::{Database, DatabaseKey};
    use kpvault_core::{AccessMode, Config};
    use tempfile::TempDir;

    const MASTER: &str = "test-master-password";

    fn setup_server(dir: &TempDir) -> VaultServer {
        let db_path = dir.path().join("test.kdbx");
        let mut db = Database::new(DatabaseConfig::default());
        let mut entry = Entry::new();
        entry
            .fields
            .insert("Title".into(), Value::Unprotected("GitHub".into()));
        entry.fields.insert(
            "Password".into(),
            Value::Protected("hunter2!".as_bytes().into()),
        );
        db.root.children.push(Node::Entry(entry));
        let mut file = std::fs::File::create(&db_path).unwrap();
        db.save(&mut file, DatabaseKey::new().with_password(MASTER))
            .unwrap();

        let config = Config {
            db_path,
            key_file: None,
            backup_dir: dir.path().join("backups"),
            access_mode: AccessMode::ReadWrite,
            auto_backup: false,
            backup_count: 5,
            session_timeout: Duration::from_secs(3600),
            auto_lock: Duration::from_secs(1800),
            max_auth_attempts: 3,
            auth_window: Duration::from_secs(300),
            max_concurrent_ops: 5,
            op_timeout: Duration::from_secs(30),
        };
        VaultServer::new(Arc::new(Vault::new(config)))
    }

    fn content_text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    async fn login(server: &VaultServer) -> String {
        let result = server
            .authenticate(Parameters(AuthenticateParams {
                password: MASTER.to_string(),
            }))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&content_text(&result)).unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_check_needs_no_session() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let result = server.health_check().await.unwrap();
        assert!(!result.is_error.unwrap_or(false));
        let text = content_text(&result);
        assert!(text.contains("\"locked\": true"));
    }

    #[tokio::test]
    async fn failed_authentication_is_a_structured_error() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let result = server
            .authenticate(Parameters(AuthenticateParams {
                password: "wrong".to_string(),
            }))
            .await
            .unwrap();
        assert!(result.is_error.unwrap_or(false));
        let body: serde_json::Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(body["error"], "authentication_error");
        // the attempted password never appears in the payload
        assert!(!content_text(&result).contains("wrong"));
    }

    #[tokio::test]
    async fn list_entries_redacts_passwords() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let token = login(&server).await;

        let result = server
            .list_entries(Parameters(ListEntriesParams {
                token,
                group_id: None,
                recursive: false,
            }))
            .await
            .unwrap();
        let text = content_text(&result);
        assert!(text.contains("GitHub"));
        assert!(!text.contains("hunter2!"));
    }

    #[tokio::test]
    async fn unknown_token_maps_to_session_not_found() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let _ = login(&server).await;

        let result = server
            .list_entries(Parameters(ListEntriesParams {
                token: "bogus".to_string(),
                group_id: None,
                recursive: false,
            }))
            .await
            .unwrap();
        assert!(result.is_error.unwrap_or(false));
        let body: serde_json::Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(body["error"], "session_not_found");
    }

    #[tokio::test]
    async fn generate_password_honors_spec() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let token = login(&server).await;

        let result = server
            .generate_password(Parameters(GeneratePasswordParams {
                token,
                length: 20,
                uppercase: true,
                lowercase: true,
                digits: true,
                symbols: true,
                min_uppercase: 1,
                min_lowercase: 1,
                min_digits: 1,
                min_symbols: 1,
                exclude_ambiguous: true,
                custom_symbols: String::new(),
                forbidden: String::new(),
            }))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(body["password"].as_str().unwrap().chars().count(), 20);
        assert!(body["strength"]["score"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn server_info_advertises_tools() {
        let dir = TempDir::new().unwrap();
        let server = setup_server(&dir);
        let info = server.get_info();
        assert!(info.instructions.unwrap().contains("credential vault"));
    }
}
