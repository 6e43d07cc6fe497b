//! Help tickets: members file a request through a form, moderators claim and close it with
//! buttons. Slash commands only.

use poise::serenity_prelude as serenity;
use poise::{CreateReply, Modal};
use serenity::{
    ButtonStyle, Colour, ComponentInteraction, ComponentInteractionCollector, CreateActionRow,
    CreateAllowedMentions, CreateButton, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage, GuildId, Mentionable, Role, RoleId, UserId,
};
use sqlx::SqlitePool;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::{EMBED_DESCRIPTION_LIMIT, HELP_TICKET_TIMEOUT, MODAL_TIMEOUT};
use crate::db::{from_db, to_db};
use crate::error::invalid;
use crate::utils::{fit_lines, log_err, Context, Error};

pub(crate) struct ModPingStore {
    pool: SqlitePool,
}

impl ModPingStore {
    pub(crate) async fn connect(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS help_categories (
                guild_id INTEGER NOT NULL,
                category_name TEXT NOT NULL,
                PRIMARY KEY (guild_id, category_name)
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS mod_roles (
                guild_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                PRIMARY KEY (guild_id, role_id)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Makes `role` the guild's only mod role.
    pub(crate) async fn set_mod_role(&self, guild: GuildId, role: RoleId) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM mod_roles WHERE guild_id = ?")
            .bind(to_db(guild.get()))
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO mod_roles (guild_id, role_id) VALUES (?, ?)")
            .bind(to_db(guild.get()))
            .bind(to_db(role.get()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    pub(crate) async fn mod_roles(&self, guild: GuildId) -> Result<Vec<RoleId>, sqlx::Error> {
        let roles: Vec<i64> = sqlx::query_scalar("SELECT role_id FROM mod_roles WHERE guild_id = ?")
            .bind(to_db(guild.get()))
            .fetch_all(&self.pool)
            .await?;
        Ok(roles.into_iter().map(|r| RoleId::new(from_db(r))).collect())
    }

    /// Returns false if the category already existed.
    pub(crate) async fn add_category(&self, guild: GuildId, name: &str) -> Result<bool, sqlx::Error> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO help_categories (guild_id, category_name) VALUES (?, ?)",
        )
        .bind(to_db(guild.get()))
        .bind(name.trim().to_lowercase())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    pub(crate) async fn categories(&self, guild: GuildId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT category_name FROM help_categories WHERE guild_id = ? ORDER BY category_name",
        )
        .bind(to_db(guild.get()))
        .fetch_all(&self.pool)
        .await
    }
}

/// Splits the comma-separated form field and checks every entry against the guild's
/// categories. On failure, returns the unknown ones.
pub(crate) fn pick_categories(input: &str, valid: &[String]) -> Result<Vec<String>, Vec<String>> {
    let mut picked: Vec<String> = Vec::new();
    for cat in input.split(',').map(|c| c.trim().to_lowercase()) {
        if !cat.is_empty() && !picked.contains(&cat) {
            picked.push(cat);
        }
    }
    let unknown: Vec<String> = picked.iter().filter(|c| !valid.contains(c)).cloned().collect();
    if !unknown.is_empty() {
        Err(unknown)
    } else if picked.is_empty() {
        Err(vec![input.trim().to_string()])
    } else {
        Ok(picked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TicketError {
    #[error("You do not have the necessary permissions to assign help requests.")]
    NotAModerator,
    #[error("You cannot assign help to yourself.")]
    OwnRequest,
    #[error("This request is already assigned to <@{0}>.")]
    AlreadyAssigned(UserId),
    #[error("You are not authorized to close this request.")]
    NotAllowedToClose,
}

/// A help request as tracked while its buttons are live.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub(crate) kind: String,
    pub(crate) description: String,
    pub(crate) categories: Vec<String>,
    pub(crate) requester: UserId,
    pub(crate) helper: Option<UserId>,
    pub(crate) status: TicketStatus,
}

impl Ticket {
    pub(crate) fn assign(
        &mut self,
        user: UserId,
        user_roles: &[RoleId],
        mod_roles: &[RoleId],
    ) -> Result<(), TicketError> {
        if !user_roles.iter().any(|r| mod_roles.contains(r)) {
            return Err(TicketError::NotAModerator);
        }
        if user == self.requester {
            return Err(TicketError::OwnRequest);
        }
        if let Some(helper) = self.helper {
            return Err(TicketError::AlreadyAssigned(helper));
        }
        self.helper = Some(user);
        self.status = TicketStatus::InProgress;
        Ok(())
    }

    pub(crate) fn close(&mut self, user: UserId) -> Result<(), TicketError> {
        if user != self.requester && Some(user) != self.helper {
            return Err(TicketError::NotAllowedToClose);
        }
        self.status = TicketStatus::Closed;
        Ok(())
    }

    fn embed(&self, footer: String) -> CreateEmbed {
        let (title, colour) = match self.status {
            TicketStatus::Open => (format!("Ping Request: {}", self.kind), Colour::ORANGE),
            TicketStatus::InProgress => (format!("Help Request: {}", self.kind), Colour::DARK_GREEN),
            TicketStatus::Closed => (format!("Closed Help Request: {}", self.kind), Colour::RED),
        };
        let mut embed = CreateEmbed::new()
            .title(title)
            .description(&self.description)
            .colour(colour)
            .field("Requester", self.requester.mention().to_string(), true);
        if self.status != TicketStatus::Open {
            let helper = self
                .helper
                .map_or_else(|| "Unassigned".to_string(), |h| h.mention().to_string());
            let status = if self.status == TicketStatus::Closed {
                "Closed"
            } else {
                "In Progress"
            };
            embed = embed
                .field("Assigned Helper", helper, true)
                .field("Status", status, false);
        }
        embed
            .field("Categories", self.categories.join(", "), false)
            .footer(CreateEmbedFooter::new(footer))
    }
}

fn now_label() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
        .unwrap_or_default()
}

#[derive(Debug, Modal)]
#[name = "Help Request Details"]
struct HelpRequestForm {
    #[name = "Help Type"]
    #[placeholder = "Briefly describe the type of help"]
    #[max_length = 50]
    kind: String,
    #[name = "Detailed Description"]
    #[placeholder = "Provide detailed information about your help request"]
    #[paragraph]
    #[max_length = 500]
    description: String,
    #[name = "Categories (comma-separated)"]
    #[placeholder = "See /modping listcategories"]
    #[max_length = 100]
    categories: String,
}

async fn ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Manage the help request system.
#[poise::command(
    slash_command,
    guild_only,
    category = "Mod Ping",
    subcommands("role", "addcategory", "listcategories")
)]
pub(crate) async fn modping(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the mod role pinged for help requests.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
async fn role(
    ctx: Context<'_>,
    #[description = "The moderator role"] role: Role,
) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    ctx.data().modping.set_mod_role(guild, role.id).await?;
    ephemeral(
        ctx,
        format!(
            "Mod role updated to '{}'. Previous role (if any) has been removed.",
            role.name
        ),
    )
    .await
}

/// Add a help request category.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
async fn addcategory(
    ctx: Context<'_>,
    #[description = "Category name"] category: String,
) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    if category.trim().is_empty() {
        return Err(invalid("Category names can't be empty."));
    }
    let added = ctx.data().modping.add_category(guild, &category).await?;
    let text = if added {
        format!("Category '{}' added to help system.", category.trim())
    } else {
        format!("Category '{}' already exists.", category.trim())
    };
    ephemeral(ctx, text).await
}

/// List available help categories.
#[poise::command(slash_command, guild_only)]
async fn listcategories(ctx: Context<'_>) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let categories = ctx.data().modping.categories(guild).await?;
    if categories.is_empty() {
        return ephemeral(ctx, "No help categories have been set up.").await;
    }
    let embed = CreateEmbed::new()
        .title("Help Categories")
        .description(fit_lines(&categories, EMBED_DESCRIPTION_LIMIT))
        .colour(Colour::BLUE);
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Create a help request.
#[poise::command(slash_command, guild_only, category = "Mod Ping")]
pub(crate) async fn helprequest(ctx: Context<'_>) -> Result<(), Error> {
    let poise::Context::Application(app) = ctx else {
        return Err(invalid("Use the /helprequest slash command."));
    };
    let guild = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let valid = ctx.data().modping.categories(guild).await?;
    if valid.is_empty() {
        return ephemeral(
            ctx,
            "No help categories are available. Ask an admin to set up categories first.",
        )
        .await;
    }
    let mod_roles = ctx.data().modping.mod_roles(guild).await?;

    let Some(form) =
        poise::execute_modal(app, None::<HelpRequestForm>, Some(MODAL_TIMEOUT)).await?
    else {
        return Ok(());
    };
    let categories = match pick_categories(&form.categories, &valid) {
        Ok(c) => c,
        Err(unknown) => {
            return ephemeral(
                ctx,
                format!(
                    "Invalid categories: {}. Please choose from: {}.",
                    unknown.join(", "),
                    valid.join(", ")
                ),
            )
            .await
        }
    };

    let mut ticket = Ticket {
        kind: form.kind,
        description: form.description,
        categories,
        requester: ctx.author().id,
        helper: None,
        status: TicketStatus::Open,
    };
    let prefix = ctx.id().to_string();
    let buttons = |enabled: bool| {
        if !enabled {
            return vec![];
        }
        vec![CreateActionRow::Buttons(vec![
            CreateButton::new(format!("{}-assign", prefix))
                .label("Assign")
                .style(ButtonStyle::Success),
            CreateButton::new(format!("{}-close", prefix))
                .label("Close Request")
                .style(ButtonStyle::Danger),
        ])]
    };

    let reply = ctx
        .send(
            CreateReply::default()
                .embed(ticket.embed(format!("Requested at {}", now_label())))
                .components(buttons(true)),
        )
        .await?;
    if !mod_roles.is_empty() {
        let mentions: Vec<String> = mod_roles.iter().map(|r| r.mention().to_string()).collect();
        ctx.send(
            CreateReply::default()
                .content(format!("Attention moderators: {}", mentions.join(" ")))
                .allowed_mentions(CreateAllowedMentions::new().roles(mod_roles.clone())),
        )
        .await?;
    }
    crate::logging::event!("Help request opened by {} in {}", ctx.author().name, guild);

    let filter_prefix = prefix.clone();
    while let Some(press) = ComponentInteractionCollector::new(ctx)
        .filter({ let filter_prefix = filter_prefix.clone(); move |i| i.data.custom_id.starts_with(&filter_prefix) })
        .timeout(HELP_TICKET_TIMEOUT)
        .await
    {
        let user = press.user.id;
        let outcome = if press.data.custom_id.ends_with("-assign") {
            let roles = press.member.as_ref().map(|m| m.roles.clone()).unwrap_or_default();
            ticket.assign(user, &roles, &mod_roles).map(|()| {
                (
                    format!("Assigned at {}", now_label()),
                    format!("You have been assigned to help {}.", ticket.requester.mention()),
                )
            })
        } else {
            ticket.close(user).map(|()| {
                (
                    format!("Closed by {} at {}", press.user.name, now_label()),
                    "Help request has been closed.".to_string(),
                )
            })
        };

        match outcome {
            Err(denied) => respond(ctx, &press, denied.to_string(), true).await,
            Ok((footer, announcement)) => {
                reply
                    .edit(
                        ctx,
                        CreateReply::default()
                            .embed(ticket.embed(footer))
                            .components(buttons(ticket.status != TicketStatus::Closed)),
                    )
                    .await?;
                respond(ctx, &press, announcement, false).await;
                if ticket.status == TicketStatus::Closed {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn respond(ctx: Context<'_>, press: &ComponentInteraction, text: String, private: bool) {
    log_err(
        press
            .create_response(
                ctx,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(text)
                        .ephemeral(private),
                ),
            )
            .await,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const MODS: RoleId = RoleId::new(50);
    const REQUESTER: UserId = UserId::new(100);
    const HELPER: UserId = UserId::new(200);
    const OTHER: UserId = UserId::new(300);

    fn ticket() -> Ticket {
        Ticket {
            kind: "Account".into(),
            description: "Can't log in".into(),
            categories: vec!["account".into()],
            requester: REQUESTER,
            helper: None,
            status: TicketStatus::Open,
        }
    }

    #[test]
    fn test_assign_rules() {
        let mut t = ticket();
        assert_eq!(
            t.assign(HELPER, &[RoleId::new(7)], &[MODS]),
            Err(TicketError::NotAModerator)
        );
        assert_eq!(t.assign(REQUESTER, &[MODS], &[MODS]), Err(TicketError::OwnRequest));
        assert_eq!(t.assign(HELPER, &[MODS], &[MODS]), Ok(()));
        assert_eq!(t.status, TicketStatus::InProgress);
        assert_eq!(
            t.assign(OTHER, &[MODS], &[MODS]),
            Err(TicketError::AlreadyAssigned(HELPER))
        );
    }

    #[test]
    fn test_close_rules() {
        let mut t = ticket();
        assert_eq!(t.close(OTHER), Err(TicketError::NotAllowedToClose));
        t.assign(HELPER, &[MODS], &[MODS]).unwrap();
        assert_eq!(t.close(HELPER), Ok(()));
        assert_eq!(t.status, TicketStatus::Closed);

        let mut unassigned = ticket();
        assert_eq!(unassigned.close(REQUESTER), Ok(()));
    }

    #[test]
    fn test_pick_categories() {
        let valid = vec!["account".to_string(), "billing".to_string()];
        assert_eq!(
            pick_categories(" Account, billing ,account", &valid),
            Ok(vec!["account".to_string(), "billing".to_string()])
        );
        assert_eq!(
            pick_categories("account, memes", &valid),
            Err(vec!["memes".to_string()])
        );
        assert!(pick_categories(" , ", &valid).is_err());
    }

    #[tokio::test]
    async fn test_store() {
        let store = ModPingStore::connect(crate::db::memory().await).await.unwrap();
        assert!(store.categories(GUILD).await.unwrap().is_empty());
        assert!(store.add_category(GUILD, "Billing").await.unwrap());
        assert!(!store.add_category(GUILD, "billing ").await.unwrap());
        store.add_category(GUILD, "account").await.unwrap();
        assert_eq!(store.categories(GUILD).await.unwrap(), vec!["account", "billing"]);

        store.set_mod_role(GUILD, RoleId::new(1)).await.unwrap();
        store.set_mod_role(GUILD, MODS).await.unwrap();
        assert_eq!(store.mod_roles(GUILD).await.unwrap(), vec![MODS]);
        assert!(store.mod_roles(GuildId::new(2)).await.unwrap().is_empty());
    }
}
