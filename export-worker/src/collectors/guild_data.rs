//! Guild data collector
//!
//! Every section of [`GuildData`] is fetched by its own task. Sections run
//! concurrently, the first failure aborts the rest, and each task returns
//! a small applier that writes its rows into the document once every task
//! has joined, so the document itself is never shared between tasks.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use shared::guild_data::*;
use sqlx::FromRow;
use sqlx::postgres::PgRow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::error::{ExportError, ExportResult};

/// Rows fetched per page for list sections
pub const PAGE_SIZE: i64 = 2_500;

/// A row type a section query can produce
#[cfg(not(test))]
pub trait SectionRow: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {}

#[cfg(not(test))]
impl<T> SectionRow for T where T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {}

/// Test sources also build rows from JSON fixtures
#[cfg(test)]
pub trait SectionRow:
    for<'r> FromRow<'r, PgRow> + serde::de::DeserializeOwned + Send + Unpin + 'static
{
}

#[cfg(test)]
impl<T> SectionRow for T where
    T: for<'r> FromRow<'r, PgRow> + serde::de::DeserializeOwned + Send + Unpin + 'static
{
}

/// Read access to the ticketing database
///
/// Queries bind `$1` guild id, `$2` limit and `$3` offset.
#[async_trait]
pub trait GuildDataSource: Send + Sync + 'static {
    async fn fetch_page<R: SectionRow>(
        &self,
        section: &'static str,
        query: &'static str,
        guild_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>, sqlx::Error>;
}

type Apply = Box<dyn FnOnce(&mut GuildData) + Send>;
type SectionFuture = BoxFuture<'static, Result<Apply, sqlx::Error>>;

struct Section<G> {
    name: &'static str,
    run: fn(Arc<G>, i64) -> SectionFuture,
}

pub struct GuildDataCollector<G> {
    source: Arc<G>,
}

impl<G: GuildDataSource> GuildDataCollector<G> {
    pub fn new(source: Arc<G>) -> Self {
        Self { source }
    }

    pub async fn collect(&self, guild_id: i64) -> ExportResult<GuildData> {
        let mut set = JoinSet::new();
        for section in sections::<G>() {
            let name = section.name;
            let fut = (section.run)(Arc::clone(&self.source), guild_id);
            set.spawn(async move {
                let started = Instant::now();
                let applied = fut
                    .await
                    .map_err(|source| ExportError::Section { section: name, source })?;
                tracing::debug!(
                    guild_id,
                    section = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Section fetched"
                );
                Ok::<Apply, ExportError>(applied)
            });
        }

        let mut data = GuildData::new(guild_id);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(apply)) => apply(&mut data),
                Ok(Err(e)) => {
                    set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    set.abort_all();
                    return Err(e.into());
                }
            }
        }

        tracing::info!(guild_id, "All guild data sections fetched");
        Ok(data)
    }
}

/// Every page of a section, until a page comes back short
async fn fetch_all<G: GuildDataSource, R: SectionRow>(
    source: &G,
    section: &'static str,
    query: &'static str,
    guild_id: i64,
) -> Result<Vec<R>, sqlx::Error> {
    let mut rows = Vec::new();
    loop {
        let page: Vec<R> = source
            .fetch_page(section, query, guild_id, PAGE_SIZE, rows.len() as i64)
            .await?;
        let exhausted = (page.len() as i64) < PAGE_SIZE;
        rows.extend(page);
        if exhausted {
            return Ok(rows);
        }
    }
}

async fn fetch_first<G: GuildDataSource, R: SectionRow>(
    source: &G,
    section: &'static str,
    query: &'static str,
    guild_id: i64,
) -> Result<Option<R>, sqlx::Error> {
    let page: Vec<R> = source.fetch_page(section, query, guild_id, 1, 0).await?;
    Ok(page.into_iter().next())
}

/// Zero values are left out of the document
fn non_default<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

fn group<K: Ord, V>(rows: Vec<(K, V)>) -> Grouped<K, V> {
    let mut grouped: Grouped<K, V> = BTreeMap::new();
    for (key, value) in rows {
        grouped.entry(key).or_default().push(value);
    }
    grouped
}

macro_rules! section {
    (@many $field:ident: $row:ty = $query:expr, $convert:expr) => {
        Section {
            name: stringify!($field),
            run: |source, guild_id| {
                async move {
                    let rows: Vec<$row> =
                        fetch_all(&*source, stringify!($field), $query, guild_id).await?;
                    let value = ($convert)(rows);
                    Ok::<Apply, sqlx::Error>(Box::new(move |data: &mut GuildData| {
                        data.$field = value
                    }))
                }
                .boxed()
            },
        }
    };
    (@one $field:ident: $row:ty = $query:expr, $convert:expr) => {
        Section {
            name: stringify!($field),
            run: |source, guild_id| {
                async move {
                    let row: Option<$row> =
                        fetch_first(&*source, stringify!($field), $query, guild_id).await?;
                    let value = non_default(($convert)(row));
                    Ok::<Apply, sqlx::Error>(Box::new(move |data: &mut GuildData| {
                        data.$field = value
                    }))
                }
                .boxed()
            },
        }
    };
    (rows $field:ident: $row:ty = $query:expr) => {
        section!(@many $field: $row = $query, |rows: Vec<$row>| rows)
    };
    (column $field:ident: $ty:ty = $query:expr) => {
        section!(@many $field: ($ty,) = $query, |rows: Vec<($ty,)>| {
            rows.into_iter().map(|(v,)| v).collect::<Vec<_>>()
        })
    };
    (grouped $field:ident: ($k:ty, $v:ty) = $query:expr) => {
        section!(@many $field: ($k, $v) = $query, group)
    };
    (map $field:ident: ($k:ty, $v:ty) = $query:expr) => {
        section!(@many $field: ($k, $v) = $query, |rows: Vec<($k, $v)>| {
            rows.into_iter().collect::<BTreeMap<_, _>>()
        })
    };
    (single $field:ident: $row:ty = $query:expr) => {
        section!(@one $field: $row = $query, |row: Option<$row>| row)
    };
    (value $field:ident: $ty:ty = $query:expr) => {
        section!(@one $field: ($ty,) = $query, |row: Option<($ty,)>| row.map(|(v,)| v))
    };
}

fn sections<G: GuildDataSource>() -> Vec<Section<G>> {
    vec![
        // ========== Single-valued settings ==========
        section!(value active_language: String = r#"
            SELECT language FROM active_language
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value archive_channel: i64 = r#"
            SELECT channel_id FROM archive_channel
            WHERE guild_id = $1 AND channel_id IS NOT NULL LIMIT $2 OFFSET $3"#),
        section!(single autoclose_settings: AutoCloseSettings = r#"
            SELECT enabled,
                   EXTRACT(EPOCH FROM since_open_with_no_response)::BIGINT AS since_open_with_no_response,
                   EXTRACT(EPOCH FROM since_last_message)::BIGINT AS since_last_message,
                   on_user_leave
            FROM auto_close
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value channel_category: i64 = r#"
            SELECT category_id FROM channel_category
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(single claim_settings: ClaimSettings = r#"
            SELECT support_can_view, support_can_type FROM claim_settings
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value close_confirmation_enabled: bool = r#"
            SELECT confirm FROM close_confirmation
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value feedback_enabled: bool = r#"
            SELECT feedback_enabled FROM feedback_enabled
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value guild_is_globally_blacklisted: bool = r#"
            SELECT EXISTS(SELECT 1 FROM server_blacklist WHERE guild_id = $1)
            LIMIT $2 OFFSET $3"#),
        section!(single guild_metadata: GuildMetadata = r#"
            SELECT on_call_role FROM guild_metadata
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value naming_scheme: String = r#"
            SELECT naming_scheme::TEXT FROM naming_scheme
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(single settings: Settings = r#"
            SELECT hide_claim_button, disable_open_command, context_menu_permission_level,
                   context_menu_add_sender, context_menu_panel, store_transcripts, use_threads,
                   ticket_notification_channel, overflow_enabled, overflow_category_id
            FROM settings
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value ticket_limit: i16 = r#"
            SELECT "limit" FROM ticket_limit
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(single ticket_permissions: TicketPermissions = r#"
            SELECT attach_files, embed_links, add_reactions FROM ticket_permissions
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value users_can_close: bool = r#"
            SELECT users_can_close FROM users_can_close
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        section!(value welcome_message: String = r#"
            SELECT welcome_message FROM welcome_messages
            WHERE guild_id = $1 LIMIT $2 OFFSET $3"#),
        // ========== Guild-wide lists ==========
        section!(column guild_blacklisted_users: i64 = r#"
            SELECT user_id FROM blacklist
            WHERE guild_id = $1
            ORDER BY user_id ASC LIMIT $2 OFFSET $3"#),
        section!(column guild_blacklisted_roles: i64 = r#"
            SELECT role_id FROM role_blacklist
            WHERE guild_id = $1
            ORDER BY role_id ASC LIMIT $2 OFFSET $3"#),
        section!(column on_call_users: i64 = r#"
            SELECT user_id FROM on_call
            WHERE guild_id = $1
            ORDER BY user_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows user_permissions: Permission = r#"
            SELECT user_id AS snowflake, support AS is_support, admin AS is_admin
            FROM permissions
            WHERE guild_id = $1
            ORDER BY user_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows role_permissions: Permission = r#"
            SELECT role_id AS snowflake, support AS is_support, admin AS is_admin
            FROM role_permissions
            WHERE guild_id = $1
            ORDER BY role_id ASC LIMIT $2 OFFSET $3"#),
        section!(map custom_colours: (i16, i32) = r#"
            SELECT colour_id, colour_code FROM custom_colours
            WHERE guild_id = $1
            ORDER BY colour_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows tags: Tag = r#"
            SELECT tag_id, guild_id, use_guild_command, content, application_command_id
            FROM tags
            WHERE guild_id = $1
            ORDER BY tag_id ASC LIMIT $2 OFFSET $3"#),
        // ========== Embeds and forms ==========
        section!(rows embeds: CustomEmbed = r#"
            SELECT id, guild_id, title, description, colour, author_name, author_icon_url,
                   author_url, image_url, thumbnail_url, footer_text, footer_icon_url,
                   (EXTRACT(EPOCH FROM "timestamp") * 1000)::BIGINT AS "timestamp"
            FROM embeds
            WHERE guild_id = $1
            ORDER BY id ASC LIMIT $2 OFFSET $3"#),
        section!(rows embed_fields: EmbedField = r#"
            SELECT f.id AS field_id, f.embed_id, f.name, f.value, f.inline
            FROM embed_fields f
            INNER JOIN embeds e ON f.embed_id = e.id
            WHERE e.guild_id = $1
            ORDER BY f.id ASC LIMIT $2 OFFSET $3"#),
        section!(rows forms: Form = r#"
            SELECT form_id, guild_id, title, custom_id FROM forms
            WHERE guild_id = $1
            ORDER BY form_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows form_inputs: FormInput = r#"
            SELECT i.id, i.form_id, i.position, i.custom_id, i.style, i.label,
                   i.placeholder, i.required, i.min_length, i.max_length
            FROM form_input i
            INNER JOIN forms f ON i.form_id = f.form_id
            WHERE f.guild_id = $1
            ORDER BY i.id ASC LIMIT $2 OFFSET $3"#),
        // ========== Panels ==========
        section!(rows panels: Panel = r#"
            SELECT panel_id, message_id, channel_id, guild_id, title, content, colour,
                   target_category, emoji_name, emoji_id, welcome_message, default_team AS with_default_team,
                   custom_id, image_url, thumbnail_url, button_style, button_label, form_id,
                   naming_scheme, force_disabled, disabled, exit_survey_form_id
            FROM panels
            WHERE guild_id = $1
            ORDER BY panel_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows multi_panels: MultiPanel = r#"
            SELECT id, message_id, channel_id, guild_id, select_menu, embed_id
            FROM multi_panels
            WHERE guild_id = $1
            ORDER BY id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped multi_panel_targets: (i32, i32) = r#"
            SELECT t.multi_panel_id, t.panel_id
            FROM multi_panel_targets t
            INNER JOIN multi_panels p ON t.multi_panel_id = p.id
            WHERE p.guild_id = $1
            ORDER BY t.multi_panel_id, t.panel_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows panel_access_control_rules: PanelAccessControlRule = r#"
            SELECT r.panel_id, r.role_id, r.position, r.action::TEXT AS action
            FROM panel_access_control_rules r
            INNER JOIN panels p ON r.panel_id = p.panel_id
            WHERE p.guild_id = $1
            ORDER BY r.panel_id, r.position ASC LIMIT $2 OFFSET $3"#),
        section!(map panel_mention_user: (i32, bool) = r#"
            SELECT m.panel_id, m.should_mention_user
            FROM panel_user_mentions m
            INNER JOIN panels p ON m.panel_id = p.panel_id
            WHERE p.guild_id = $1
            ORDER BY m.panel_id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped panel_role_mentions: (i32, i64) = r#"
            SELECT m.panel_id, m.role_id
            FROM panel_role_mentions m
            INNER JOIN panels p ON m.panel_id = p.panel_id
            WHERE p.guild_id = $1
            ORDER BY m.panel_id, m.role_id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped panel_teams: (i32, i32) = r#"
            SELECT t.panel_id, t.team_id
            FROM panel_teams t
            INNER JOIN panels p ON t.panel_id = p.panel_id
            WHERE p.guild_id = $1
            ORDER BY t.panel_id, t.team_id ASC LIMIT $2 OFFSET $3"#),
        // ========== Support teams ==========
        section!(rows support_teams: SupportTeam = r#"
            SELECT id, guild_id, name, on_call_role_id FROM support_team
            WHERE guild_id = $1
            ORDER BY id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped support_team_users: (i32, i64) = r#"
            SELECT m.team_id, m.user_id
            FROM support_team_members m
            INNER JOIN support_team t ON m.team_id = t.id
            WHERE t.guild_id = $1
            ORDER BY m.team_id, m.user_id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped support_team_roles: (i32, i64) = r#"
            SELECT r.team_id, r.role_id
            FROM support_team_roles r
            INNER JOIN support_team t ON r.team_id = t.id
            WHERE t.guild_id = $1
            ORDER BY r.team_id, r.role_id ASC LIMIT $2 OFFSET $3"#),
        // ========== Tickets ==========
        section!(rows tickets: Ticket = r#"
            SELECT id, guild_id, channel_id, user_id, open,
                   (EXTRACT(EPOCH FROM open_time) * 1000)::BIGINT AS open_time,
                   welcome_message_id, panel_id, has_transcript,
                   (EXTRACT(EPOCH FROM close_time) * 1000)::BIGINT AS close_time,
                   is_thread, join_message_id, notes_thread_id, status::TEXT AS status
            FROM tickets
            WHERE guild_id = $1
            ORDER BY id ASC LIMIT $2 OFFSET $3"#),
        section!(rows archive_messages: ArchiveMessage = r#"
            SELECT ticket_id, channel_id, message_id FROM archive_messages
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(column autoclose_excluded: i32 = r#"
            SELECT ticket_id FROM auto_close_exclude
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows close_reasons: CloseReason = r#"
            SELECT ticket_id, close_reason, closed_by FROM close_reason
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows exit_survey_responses: ExitSurveyResponse = r#"
            SELECT ticket_id, form_id, question_id, response FROM exit_survey_responses
            WHERE guild_id = $1
            ORDER BY ticket_id, question_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows first_response_times: FirstResponseTime = r#"
            SELECT ticket_id, user_id, EXTRACT(EPOCH FROM response_time)::BIGINT AS response_time
            FROM first_response_time
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped participants: (i32, i64) = r#"
            SELECT ticket_id, user_id FROM participant
            WHERE guild_id = $1
            ORDER BY ticket_id, user_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows service_ratings: ServiceRating = r#"
            SELECT ticket_id, rating FROM service_ratings
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows ticket_claims: TicketClaim = r#"
            SELECT ticket_id, user_id FROM ticket_claims
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(rows ticket_last_messages: TicketLastMessage = r#"
            SELECT ticket_id, last_message_id,
                   (EXTRACT(EPOCH FROM last_message_time) * 1000)::BIGINT AS last_message_time,
                   user_id, user_is_staff
            FROM ticket_last_message
            WHERE guild_id = $1
            ORDER BY ticket_id ASC LIMIT $2 OFFSET $3"#),
        section!(grouped ticket_additional_members: (i32, i64) = r#"
            SELECT ticket_id, user_id FROM ticket_members
            WHERE guild_id = $1
            ORDER BY ticket_id, user_id ASC LIMIT $2 OFFSET $3"#),
    ]
}
