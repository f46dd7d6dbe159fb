use crate::error::{Error, Result};
use crate::store::AuditStore;
use crate::types::{RoleName, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Audited administrative action. Closed enumeration, never free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum AuditAction {
    // Authentication
    LoginSuccess,
    LoginFailed,
    Logout,
    PasswordChanged,
    PasswordResetRequested,

    // User administration
    CreateUser,
    UpdateUser,
    DeleteUser,
    UpdateUserRole,
    ExportUsers,

    // Role administration
    CreateRole,
    UpdateRole,
    DeleteRole,
    AssignRole,

    // Catalog
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    BulkImportProducts,
    BulkDeleteProducts,
    UpdateCategory,

    // Orders
    UpdateOrderStatus,
    RefundOrder,
    DeleteOrder,
    ExportOrders,

    // Security
    UnauthorizedAccess,
    IpBlocked,
    RateLimitExceeded,
    SuspiciousActivity,

    // Settings and audit log administration
    UpdateSettings,
    ViewAuditLogs,
    ExportAuditLogs,
    PurgeAuditLogs,
    ReviewAuditEntry,
}

impl AuditAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            Self::CreateUser => "CREATE_USER",
            Self::UpdateUser => "UPDATE_USER",
            Self::DeleteUser => "DELETE_USER",
            Self::UpdateUserRole => "UPDATE_USER_ROLE",
            Self::ExportUsers => "EXPORT_USERS",
            Self::CreateRole => "CREATE_ROLE",
            Self::UpdateRole => "UPDATE_ROLE",
            Self::DeleteRole => "DELETE_ROLE",
            Self::AssignRole => "ASSIGN_ROLE",
            Self::CreateProduct => "CREATE_PRODUCT",
            Self::UpdateProduct => "UPDATE_PRODUCT",
            Self::DeleteProduct => "DELETE_PRODUCT",
            Self::BulkImportProducts => "BULK_IMPORT_PRODUCTS",
            Self::BulkDeleteProducts => "BULK_DELETE_PRODUCTS",
            Self::UpdateCategory => "UPDATE_CATEGORY",
            Self::UpdateOrderStatus => "UPDATE_ORDER_STATUS",
            Self::RefundOrder => "REFUND_ORDER",
            Self::DeleteOrder => "DELETE_ORDER",
            Self::ExportOrders => "EXPORT_ORDERS",
            Self::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            Self::IpBlocked => "IP_BLOCKED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::UpdateSettings => "UPDATE_SETTINGS",
            Self::ViewAuditLogs => "VIEW_AUDIT_LOGS",
            Self::ExportAuditLogs => "EXPORT_AUDIT_LOGS",
            Self::PurgeAuditLogs => "PURGE_AUDIT_LOGS",
            Self::ReviewAuditEntry => "REVIEW_AUDIT_ENTRY",
        }
    }

    /// Whether the action name denotes deletion or bulk work.
    pub fn denotes_destruction(&self) -> bool {
        let name = self.as_str();
        name.starts_with("DELETE_") || name.starts_with("BULK_")
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse severity classification, fixed at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention window per risk level, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDays {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

impl Default for RetentionDays {
    fn default() -> Self {
        // 1 / 3 / 7 / 10 years.
        Self {
            low: 365,
            medium: 1095,
            high: 2555,
            critical: 3650,
        }
    }
}

impl RetentionDays {
    pub fn for_level(&self, level: RiskLevel) -> i64 {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Risk classification and retention table, injected into [`AuditTrail`].
///
/// Classification runs once when an entry is written and is never
/// revisited, even if the table changes afterwards.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    critical_actions: Vec<AuditAction>,
    high_actions: Vec<AuditAction>,
    retention: RetentionDays,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            critical_actions: vec![
                AuditAction::IpBlocked,
                AuditAction::SuspiciousActivity,
                AuditAction::PurgeAuditLogs,
            ],
            high_actions: vec![
                AuditAction::DeleteUser,
                AuditAction::UpdateUserRole,
                AuditAction::AssignRole,
                AuditAction::DeleteRole,
                AuditAction::RefundOrder,
                AuditAction::ExportUsers,
                AuditAction::UnauthorizedAccess,
                AuditAction::UpdateSettings,
            ],
            retention: RetentionDays::default(),
        }
    }
}

impl RiskConfig {
    /// Builds a custom table; `critical` and `high` are explicit lists,
    /// everything else falls through the destruction rule to LOW.
    pub fn new(
        critical: Vec<AuditAction>,
        high: Vec<AuditAction>,
        retention: RetentionDays,
    ) -> Self {
        Self {
            critical_actions: critical,
            high_actions: high,
            retention,
        }
    }

    /// Classifies an action.
    pub fn classify(&self, action: AuditAction) -> RiskLevel {
        if self.critical_actions.contains(&action) {
            RiskLevel::Critical
        } else if self.high_actions.contains(&action) {
            RiskLevel::High
        } else if action.denotes_destruction() {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Retention expiry for an entry classified at `level`.
    pub fn retention_date(&self, level: RiskLevel, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.retention.for_level(level))
    }
}

/// Request metadata captured alongside an audited action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestContext {
    pub endpoint: String,
    pub method: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Outcome of the audited action.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outcome {
    pub status_code: u16,
    pub success: bool,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

impl Outcome {
    pub fn ok(status_code: u16, response_time_ms: u64) -> Self {
        Self {
            status_code,
            success: true,
            response_time_ms,
            error_message: None,
        }
    }

    pub fn failed(status_code: u16, response_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            status_code,
            success: false,
            response_time_ms,
            error_message: Some(error.into()),
        }
    }
}

/// Input to [`AuditTrail::record`]; risk and retention are derived.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub actor: UserId,
    pub actor_role: Option<RoleName>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub context: RequestContext,
    pub outcome: Outcome,
    /// Free-form detail, e.g. before/after state for mutations.
    pub details: Option<String>,
}

impl AuditRecord {
    pub fn new(actor: UserId, action: AuditAction, resource_type: impl Into<String>) -> Self {
        Self {
            actor,
            actor_role: None,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            context: RequestContext::default(),
            outcome: Outcome::ok(200, 0),
            details: None,
        }
    }

    pub fn actor_role(mut self, role: RoleName) -> Self {
        self.actor_role = Some(role);
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Immutable audit log entry.
///
/// Once written, only the review fields ever change. Entries leave the
/// store solely through the retention sweep or an explicit purge.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuditEntry {
    /// Store-assigned sequence number.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: UserId,
    pub actor_role: Option<RoleName>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub context: RequestContext,
    pub outcome: Outcome,
    pub details: Option<String>,
    pub risk_level: RiskLevel,
    pub retention_date: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Filter for audit queries. Results are descending by time.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor: Option<UserId>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub reviewed: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_level = Some(level);
        self
    }

    pub fn reviewed(mut self, reviewed: bool) -> Self {
        self.reviewed = Some(reviewed);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether an entry passes every set predicate. Pagination is applied
    /// by the store, not here.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = &self.actor
            && &entry.actor != actor
        {
            return false;
        }
        if let Some(action) = self.action
            && entry.action != action
        {
            return false;
        }
        if let Some(resource_type) = &self.resource_type
            && &entry.resource_type != resource_type
        {
            return false;
        }
        if let Some(resource_id) = &self.resource_id
            && entry.resource_id.as_deref() != Some(resource_id.as_str())
        {
            return false;
        }
        if let Some(level) = self.risk_level
            && entry.risk_level != level
        {
            return false;
        }
        if let Some(reviewed) = self.reviewed
            && entry.reviewed != reviewed
        {
            return false;
        }
        if let Some(from) = self.from
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && entry.timestamp > to
        {
            return false;
        }
        true
    }
}

/// Per-action aggregate over a filtered result set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionStats {
    pub action: AuditAction,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}

/// Per-actor activity summary over a filtered result set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActorStats {
    pub actor: UserId,
    pub total: u64,
    pub failed: u64,
    pub last_seen: DateTime<Utc>,
}

/// Destination for best-effort audit writes.
///
/// `record` never fails from the caller's perspective; implementations
/// catch and log persistence problems so the primary action is never
/// aborted by its own paper trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Sink that drops every record. Default for evaluators and admin
/// services constructed without an audit trail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuditSink;

#[async_trait]
impl AuditSink for NoAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}

/// Append-create-only audit log service over a pluggable [`AuditStore`].
#[derive(Debug, Clone)]
pub struct AuditTrail<A> {
    store: A,
    config: RiskConfig,
}

impl<A> AuditTrail<A>
where
    A: AuditStore,
{
    /// Creates a trail with the default classification table.
    pub fn new(store: A) -> Self {
        Self {
            store,
            config: RiskConfig::default(),
        }
    }

    /// Overrides the classification table.
    pub fn with_config(mut self, config: RiskConfig) -> Self {
        self.config = config;
        self
    }

    /// Classifies, stamps retention and appends an entry.
    pub async fn record(&self, record: AuditRecord) -> Result<AuditEntry> {
        let now = Utc::now();
        let risk_level = self.config.classify(record.action);
        let entry = AuditEntry {
            id: 0,
            timestamp: now,
            actor: record.actor,
            actor_role: record.actor_role,
            action: record.action,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            context: record.context,
            outcome: record.outcome,
            details: record.details,
            risk_level,
            retention_date: self.config.retention_date(risk_level, now),
            reviewed: false,
            reviewed_by: None,
            reviewed_at: None,
        };
        self.store.append(entry).await.map_err(Error::from)
    }

    /// Returns filtered entries, newest first.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        self.store.query(filter).await.map_err(Error::from)
    }

    /// Counts entries matching a filter, ignoring pagination.
    pub async fn count(&self, filter: &AuditFilter) -> Result<u64> {
        self.store.count(filter).await.map_err(Error::from)
    }

    /// Sets the review fields on an entry; the only permitted mutation.
    pub async fn mark_reviewed(&self, id: u64, reviewer: &UserId) -> Result<bool> {
        self.store
            .mark_reviewed(id, reviewer, Utc::now())
            .await
            .map_err(Error::from)
    }

    /// Per-action counts, success/failure split and average latency.
    pub async fn action_stats(&self, filter: &AuditFilter) -> Result<Vec<ActionStats>> {
        let entries = self.query(filter).await?;
        let mut grouped: BTreeMap<&'static str, (AuditAction, u64, u64, u64)> = BTreeMap::new();
        for entry in &entries {
            let slot = grouped
                .entry(entry.action.as_str())
                .or_insert((entry.action, 0, 0, 0));
            slot.1 += 1;
            if entry.outcome.success {
                slot.2 += 1;
            }
            slot.3 += entry.outcome.response_time_ms;
        }
        Ok(grouped
            .into_values()
            .map(|(action, total, succeeded, time_total)| ActionStats {
                action,
                total,
                succeeded,
                failed: total - succeeded,
                avg_response_ms: time_total as f64 / total as f64,
            })
            .collect())
    }

    /// Per-actor activity summaries, most active first.
    pub async fn actor_stats(&self, filter: &AuditFilter) -> Result<Vec<ActorStats>> {
        let entries = self.query(filter).await?;
        let mut grouped: BTreeMap<String, ActorStats> = BTreeMap::new();
        for entry in &entries {
            let slot = grouped
                .entry(entry.actor.as_str().to_string())
                .or_insert_with(|| ActorStats {
                    actor: entry.actor.clone(),
                    total: 0,
                    failed: 0,
                    last_seen: entry.timestamp,
                });
            slot.total += 1;
            if !entry.outcome.success {
                slot.failed += 1;
            }
            if entry.timestamp > slot.last_seen {
                slot.last_seen = entry.timestamp;
            }
        }
        let mut stats: Vec<ActorStats> = grouped.into_values().collect();
        stats.sort_by(|a, b| b.total.cmp(&a.total));
        Ok(stats)
    }

    /// Renders a filtered result set as CSV.
    pub async fn export_csv(&self, filter: &AuditFilter) -> Result<String> {
        let entries = self.query(filter).await?;
        let mut out = String::from(
            "id,timestamp,actor,actor_role,action,resource_type,resource_id,endpoint,method,ip,\
             status_code,success,response_time_ms,risk_level,retention_date,reviewed,error_message\n",
        );
        for entry in &entries {
            let fields = [
                entry.id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.actor.to_string(),
                entry
                    .actor_role
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                entry.action.to_string(),
                entry.resource_type.clone(),
                entry.resource_id.clone().unwrap_or_default(),
                entry.context.endpoint.clone(),
                entry.context.method.clone(),
                entry.context.ip.clone().unwrap_or_default(),
                entry.outcome.status_code.to_string(),
                entry.outcome.success.to_string(),
                entry.outcome.response_time_ms.to_string(),
                entry.risk_level.to_string(),
                entry.retention_date.to_rfc3339(),
                entry.reviewed.to_string(),
                entry.outcome.error_message.clone().unwrap_or_default(),
            ];
            let row: Vec<String> = fields.iter().map(|field| csv_escape(field)).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }
        Ok(out)
    }

    /// Removes entries whose retention date has passed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let removed = self
            .store
            .delete_expired(Utc::now())
            .await
            .map_err(Error::from)?;
        if removed > 0 {
            tracing::debug!(removed, "audit retention sweep");
        }
        Ok(removed)
    }

    /// Explicit administrative purge of entries older than `days`,
    /// independent of computed retention.
    pub async fn purge_before(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        self.store.delete_before(cutoff).await.map_err(Error::from)
    }
}

#[async_trait]
impl<A> AuditSink for AuditTrail<A>
where
    A: AuditStore,
{
    async fn record(&self, record: AuditRecord) {
        let action = record.action;
        if let Err(error) = AuditTrail::record(self, record).await {
            tracing::error!(%action, %error, "audit write failed; primary action unaffected");
        }
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
