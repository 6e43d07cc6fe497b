//! Shows someone's avatar, with buttons to flip between their server and global pictures.

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{
    ButtonStyle, ComponentInteractionCollector, CreateActionRow, CreateButton, CreateEmbed,
    CreateInteractionResponse, CreateInteractionResponseMessage, Member,
};

use crate::config::INTERACTIVE_TIMEOUT;
use crate::utils::{log_err, requested_by, Context, Error, BLURPLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AvatarView {
    Server,
    Global,
}

impl AvatarView {
    fn suffix(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Global => "global",
        }
    }

    /// Which button a custom id belongs to, given this invocation's id prefix.
    fn from_custom_id(custom_id: &str, prefix: &str) -> Option<Self> {
        match custom_id.strip_prefix(prefix)?.strip_prefix('-')? {
            "server" => Some(Self::Server),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

struct Avatars {
    name: String,
    server: String,
    global: String,
}

impl Avatars {
    fn url(&self, view: AvatarView) -> &str {
        match view {
            AvatarView::Server => &self.server,
            AvatarView::Global => &self.global,
        }
    }

    fn embed(&self, view: AvatarView, author: &serenity::User) -> CreateEmbed {
        let title = match view {
            AvatarView::Server => format!("{}'s Server Avatar", self.name),
            AvatarView::Global => format!("{}'s Avatar", self.name),
        };
        CreateEmbed::new()
            .title(title)
            .colour(BLURPLE)
            .image(self.url(view))
            .footer(requested_by(author))
    }

    fn buttons(&self, view: AvatarView, prefix: &str) -> Vec<CreateActionRow> {
        let toggle = |v: AvatarView, label: &str| {
            CreateButton::new(format!("{}-{}", prefix, v.suffix()))
                .label(label)
                .style(ButtonStyle::Primary)
                .disabled(v == view)
        };
        vec![CreateActionRow::Buttons(vec![
            toggle(AvatarView::Server, "Server Avatar"),
            toggle(AvatarView::Global, "Global Avatar"),
            CreateButton::new_link(self.url(view)).label("Download"),
        ])]
    }
}

/// Shows a member's avatar.
#[poise::command(prefix_command, guild_only, category = "Utility", aliases("av", "pfp"))]
pub(crate) async fn avatar(
    ctx: Context<'_>,
    #[description = "Whose avatar to show (default: you)"] member: Option<Member>,
) -> Result<(), Error> {
    let member = match member {
        Some(m) => m,
        None => ctx
            .author_member()
            .await
            .ok_or_else(|| crate::error::invalid("Couldn't find you in this server."))?
            .into_owned(),
    };
    let avatars = Avatars {
        name: member.display_name().to_string(),
        server: member.face(),
        global: member.user.face(),
    };

    let prefix = ctx.id().to_string();
    let mut view = AvatarView::Server;
    let reply = ctx
        .send(
            CreateReply::default()
                .embed(avatars.embed(view, ctx.author()))
                .components(avatars.buttons(view, &prefix)),
        )
        .await?;

    let filter_prefix = prefix.clone();
    while let Some(press) = ComponentInteractionCollector::new(ctx)
        .filter({ let filter_prefix = filter_prefix.clone(); move |i| i.data.custom_id.starts_with(&filter_prefix) })
        .timeout(INTERACTIVE_TIMEOUT)
        .await
    {
        if press.user.id != ctx.author().id {
            log_err(
                press
                    .create_response(
                        ctx,
                        CreateInteractionResponse::Message(
                            CreateInteractionResponseMessage::new()
                                .content("These buttons aren't for you.")
                                .ephemeral(true),
                        ),
                    )
                    .await,
            );
            continue;
        }

        if let Some(picked) = AvatarView::from_custom_id(&press.data.custom_id, &prefix) {
            view = picked;
        }
        press
            .create_response(
                ctx,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .embed(avatars.embed(view, ctx.author()))
                        .components(avatars.buttons(view, &prefix)),
                ),
            )
            .await?;
    }

    log_err(
        reply
            .edit(
                ctx,
                CreateReply::default()
                    .embed(avatars.embed(view, ctx.author()))
                    .components(vec![]),
            )
            .await,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_ids() {
        assert_eq!(
            AvatarView::from_custom_id("123-server", "123"),
            Some(AvatarView::Server)
        );
        assert_eq!(
            AvatarView::from_custom_id("123-global", "123"),
            Some(AvatarView::Global)
        );
        assert_eq!(AvatarView::from_custom_id("124-global", "123"), None);
        assert_eq!(AvatarView::from_custom_id("123-banner", "123"), None);
    }
}
