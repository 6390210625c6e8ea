//! Guild data export document
//!
//! One [`GuildData`] aggregates every section read from the ticketing
//! database for a single guild. Single-valued sections are `None` when the
//! guild has no row or the stored value equals the type's default; list and
//! map sections are left empty and omitted from the serialized document.
//!
//! Snowflakes are `i64`, ticket/panel/form ids are `i32`, and timestamps are
//! Unix milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from a parent id to the ids grouped under it
pub type Grouped<K, V> = BTreeMap<K, Vec<V>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildData {
    pub guild_id: i64,

    // ========== Single-valued settings ==========
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_channel: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoclose_settings: Option<AutoCloseSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_category: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_settings: Option<ClaimSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_confirmation_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_is_globally_blacklisted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_metadata: Option<GuildMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_limit: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_permissions: Option<TicketPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_can_close: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,

    // ========== Guild-wide lists ==========
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guild_blacklisted_users: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guild_blacklisted_roles: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_call_users: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_colours: BTreeMap<i16, i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,

    // ========== Embeds and forms ==========
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<CustomEmbed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embed_fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<Form>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_inputs: Vec<FormInput>,

    // ========== Panels ==========
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub panels: Vec<Panel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_panels: Vec<MultiPanel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub multi_panel_targets: Grouped<i32, i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub panel_access_control_rules: Vec<PanelAccessControlRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub panel_mention_user: BTreeMap<i32, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub panel_role_mentions: Grouped<i32, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub panel_teams: Grouped<i32, i32>,

    // ========== Support teams ==========
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub support_teams: Vec<SupportTeam>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub support_team_users: Grouped<i32, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub support_team_roles: Grouped<i32, i64>,

    // ========== Tickets ==========
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<Ticket>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archive_messages: Vec<ArchiveMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autoclose_excluded: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub close_reasons: Vec<CloseReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_survey_responses: Vec<ExitSurveyResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub first_response_times: Vec<FirstResponseTime>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participants: Grouped<i32, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_ratings: Vec<ServiceRating>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ticket_claims: Vec<TicketClaim>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ticket_last_messages: Vec<TicketLastMessage>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ticket_additional_members: Grouped<i32, i64>,
}

impl GuildData {
    pub fn new(guild_id: i64) -> Self {
        Self {
            guild_id,
            ..Default::default()
        }
    }
}

// ========== Single-valued section rows ==========

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct AutoCloseSettings {
    pub enabled: bool,
    /// Seconds since open with no response
    pub since_open_with_no_response: Option<i64>,
    /// Seconds since the last message
    pub since_last_message: Option<i64>,
    pub on_user_leave: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ClaimSettings {
    pub support_can_view: bool,
    pub support_can_type: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct GuildMetadata {
    pub on_call_role: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Settings {
    pub hide_claim_button: bool,
    pub disable_open_command: bool,
    pub context_menu_permission_level: i16,
    pub context_menu_add_sender: bool,
    pub context_menu_panel: Option<i32>,
    pub store_transcripts: bool,
    pub use_threads: bool,
    pub ticket_notification_channel: Option<i64>,
    pub overflow_enabled: bool,
    pub overflow_category_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TicketPermissions {
    pub attach_files: bool,
    pub embed_links: bool,
    pub add_reactions: bool,
}

// ========== List section rows ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Permission {
    pub snowflake: i64,
    pub is_support: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Tag {
    pub tag_id: String,
    pub guild_id: i64,
    pub use_guild_command: bool,
    pub content: Option<String>,
    pub application_command_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CustomEmbed {
    pub id: i32,
    pub guild_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub colour: i32,
    pub author_name: Option<String>,
    pub author_icon_url: Option<String>,
    pub author_url: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub footer_text: Option<String>,
    pub footer_icon_url: Option<String>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct EmbedField {
    pub field_id: i32,
    pub embed_id: i32,
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Form {
    pub form_id: i32,
    pub guild_id: i64,
    pub title: String,
    pub custom_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FormInput {
    pub id: i32,
    pub form_id: i32,
    pub position: i32,
    pub custom_id: String,
    pub style: i16,
    pub label: String,
    pub placeholder: Option<String>,
    pub required: bool,
    pub min_length: Option<i16>,
    pub max_length: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Panel {
    pub panel_id: i32,
    pub message_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub title: String,
    pub content: String,
    pub colour: i32,
    pub target_category: i64,
    pub emoji_name: Option<String>,
    pub emoji_id: Option<i64>,
    pub welcome_message: Option<i32>,
    pub with_default_team: bool,
    pub custom_id: String,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub button_style: i16,
    pub button_label: String,
    pub form_id: Option<i32>,
    pub naming_scheme: Option<String>,
    pub force_disabled: bool,
    pub disabled: bool,
    pub exit_survey_form_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct MultiPanel {
    pub id: i32,
    pub message_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub select_menu: bool,
    pub embed_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PanelAccessControlRule {
    pub panel_id: i32,
    pub role_id: i64,
    pub position: i32,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SupportTeam {
    pub id: i32,
    pub guild_id: i64,
    pub name: String,
    pub on_call_role_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Ticket {
    pub id: i32,
    pub guild_id: i64,
    pub channel_id: Option<i64>,
    pub user_id: i64,
    pub open: bool,
    pub open_time: i64,
    pub welcome_message_id: Option<i64>,
    pub panel_id: Option<i32>,
    pub has_transcript: bool,
    pub close_time: Option<i64>,
    pub is_thread: bool,
    pub join_message_id: Option<i64>,
    pub notes_thread_id: Option<i64>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ArchiveMessage {
    pub ticket_id: i32,
    pub channel_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CloseReason {
    pub ticket_id: i32,
    pub close_reason: Option<String>,
    pub closed_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ExitSurveyResponse {
    pub ticket_id: i32,
    pub form_id: Option<i32>,
    pub question_id: i32,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FirstResponseTime {
    pub ticket_id: i32,
    pub user_id: i64,
    /// Seconds until the first staff response
    pub response_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ServiceRating {
    pub ticket_id: i32,
    pub rating: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TicketClaim {
    pub ticket_id: i32,
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TicketLastMessage {
    pub ticket_id: i32,
    pub last_message_id: Option<i64>,
    pub last_message_time: Option<i64>,
    pub user_id: Option<i64>,
    pub user_is_staff: Option<bool>,
}
