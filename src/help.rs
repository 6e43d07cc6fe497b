//! The help command: a detailed page for one command, or a paged catalogue of everything the
//! caller is allowed to see.

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{
    ButtonStyle, ComponentInteractionCollector, ComponentInteractionDataKind, CreateActionRow,
    CreateButton, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateSelectMenu, CreateSelectMenuKind,
    CreateSelectMenuOption,
};

use crate::config::{HELP_PAGE_SIZE, INTERACTIVE_TIMEOUT};
use crate::utils::{log_err, requested_by, warning, Command, Context, Error, BLURPLE};

const UNCATEGORIZED: &str = "Uncategorized";
const ALL: &str = "all";

/// `i.love <first> [second]`. Slash-only commands get a `/`.
pub(crate) fn usage(prefix: &str, command: &Command) -> String {
    let prefix = if command.prefix_action.is_none() && command.slash_action.is_some() {
        "/"
    } else {
        prefix
    };
    let mut line = format!("{}{}", prefix, command.qualified_name);
    for param in &command.parameters {
        if param.required {
            line.push_str(&format!(" <{}>", param.name));
        } else {
            line.push_str(&format!(" [{}]", param.name));
        }
    }
    line
}

fn summary(command: &Command) -> &str {
    command
        .description
        .as_deref()
        .or(command.help_text.as_deref())
        .unwrap_or("No description.")
}

/// The detailed page for one command.
pub(crate) fn command_embed(prefix: &str, command: &Command) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("Help: {}", command.qualified_name))
        .colour(BLURPLE)
        .description(command.help_text.as_deref().unwrap_or_else(|| summary(command)))
        .field("Usage", format!("`{}`", usage(prefix, command)), false);
    if !command.subcommands.is_empty() {
        let subs: Vec<String> = command
            .subcommands
            .iter()
            .filter(|c| !c.hide_in_help)
            .map(|c| format!("`{}` {}", usage(prefix, c), summary(c)))
            .collect();
        embed = embed.field("Subcommands", subs.join("\n"), false);
    }
    if !command.aliases.is_empty() {
        let aliases: Vec<String> = command.aliases.iter().map(|a| format!("`{}`", a)).collect();
        embed = embed.field("Aliases", aliases.join(", "), false);
    }
    if !command.required_permissions.is_empty() {
        embed = embed.field(
            "Required Permissions",
            command.required_permissions.to_string(),
            false,
        );
    }
    embed.footer(CreateEmbedFooter::new(
        "<required> arguments must be given, [optional] ones may be left out",
    ))
}

fn visible(command: &Command, is_owner: bool) -> bool {
    !command.hide_in_help && (is_owner || !command.owners_only)
}

fn category(command: &Command) -> &str {
    command.category.as_deref().unwrap_or(UNCATEGORIZED)
}

/// Every command the caller may see, in registration order.
pub(crate) fn catalogue(commands: &[Command], is_owner: bool) -> Vec<&Command> {
    commands.iter().filter(|c| visible(c, is_owner)).collect()
}

/// Sorted, without duplicates.
pub(crate) fn categories<'a>(commands: &[&'a Command]) -> Vec<&'a str> {
    let mut names: Vec<&str> = commands.iter().map(|c| category(c)).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Where the paged view currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pager {
    /// `None` for all commands.
    pub(crate) category: Option<String>,
    pub(crate) page: usize,
}

impl Pager {
    pub(crate) fn select<'a>(&self, commands: &[&'a Command]) -> Vec<&'a Command> {
        commands
            .iter()
            .filter(|c| self.category.as_deref().map_or(true, |cat| category(c) == cat))
            .copied()
            .collect()
    }

    pub(crate) fn page_count(total: usize) -> usize {
        total.div_ceil(HELP_PAGE_SIZE).max(1)
    }

    pub(crate) fn next(&mut self, total: usize) {
        self.page = (self.page + 1).min(Self::page_count(total) - 1);
    }

    pub(crate) fn prev(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    pub(crate) fn pick_category(&mut self, value: &str) {
        self.category = (value != ALL).then(|| value.to_string());
        self.page = 0;
    }
}

fn page_embed(ctx: Context<'_>, pager: &Pager, shown: &[&Command]) -> CreateEmbed {
    let pages = Pager::page_count(shown.len());
    let lines: Vec<String> = shown
        .iter()
        .skip(pager.page * HELP_PAGE_SIZE)
        .take(HELP_PAGE_SIZE)
        .map(|c| format!("**`{}`**\n{}", usage(ctx.prefix(), c), summary(c)))
        .collect();
    let title = match &pager.category {
        Some(cat) => format!("📖 Help: {}", cat),
        None => "📖 Help: All Commands".to_string(),
    };
    CreateEmbed::new()
        .title(title)
        .colour(BLURPLE)
        .description(format!(
            "Use `{}help <command>` for details.\n\n{}",
            ctx.prefix(),
            lines.join("\n\n")
        ))
        .footer(
            requested_by(ctx.author())
                .text(format!("Page {}/{} | Requested by {}", pager.page + 1, pages, ctx.author().name)),
        )
}

fn controls(id: &str, pager: &Pager, categories: &[&str], total: usize) -> Vec<CreateActionRow> {
    let mut options = vec![CreateSelectMenuOption::new("All Commands", ALL)
        .default_selection(pager.category.is_none())];
    options.extend(categories.iter().map(|cat| {
        CreateSelectMenuOption::new(*cat, *cat)
            .default_selection(pager.category.as_deref() == Some(*cat))
    }));
    let pages = Pager::page_count(total);
    vec![
        CreateActionRow::SelectMenu(
            CreateSelectMenu::new(format!("{}-category", id), CreateSelectMenuKind::String { options })
                .placeholder("Pick a category"),
        ),
        CreateActionRow::Buttons(vec![
            CreateButton::new(format!("{}-prev", id))
                .label("◀ Prev")
                .style(ButtonStyle::Secondary)
                .disabled(pager.page == 0),
            CreateButton::new(format!("{}-next", id))
                .label("Next ▶")
                .style(ButtonStyle::Secondary)
                .disabled(pager.page + 1 >= pages),
        ]),
    ]
}

/// Shows the command list, or details for one command.
#[poise::command(prefix_command, category = "Utility")]
pub(crate) async fn help(
    ctx: Context<'_>,
    #[description = "Command to show details for"]
    #[rest]
    command: Option<String>,
) -> Result<(), Error> {
    let is_owner = ctx.framework().options().owners.contains(&ctx.author().id);
    let commands = &ctx.framework().options().commands;

    if let Some(query) = command.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let found = poise::find_command(commands, query, true, &mut Vec::new())
            .map(|(cmd, _, _)| cmd)
            .filter(|cmd| visible(cmd, is_owner));
        let embed = match found {
            Some(cmd) => command_embed(ctx.prefix(), cmd),
            None => warning(
                "Command Not Found",
                format!("There's no command called `{}`.", query),
            ),
        };
        ctx.send(CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let all = catalogue(commands, is_owner);
    let cats = categories(&all);
    let mut pager = Pager {
        category: None,
        page: 0,
    };
    let id = ctx.id().to_string();

    let shown = pager.select(&all);
    let reply = ctx
        .send(
            CreateReply::default()
                .embed(page_embed(ctx, &pager, &shown))
                .components(controls(&id, &pager, &cats, shown.len())),
        )
        .await?;

    let filter_id = id.clone();
    while let Some(press) = ComponentInteractionCollector::new(ctx)
        .filter({ let filter_id = filter_id.clone(); move |i| i.data.custom_id.starts_with(&filter_id) })
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
                                .content("Only the person who asked for help can use these.")
                                .ephemeral(true),
                        ),
                    )
                    .await,
            );
            continue;
        }

        match &press.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => {
                if let Some(value) = values.first() {
                    pager.pick_category(value);
                }
            }
            _ if press.data.custom_id.ends_with("-next") => {
                pager.next(pager.select(&all).len())
            }
            _ if press.data.custom_id.ends_with("-prev") => pager.prev(),
            _ => {}
        }

        let shown = pager.select(&all);
        press
            .create_response(
                ctx,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .embed(page_embed(ctx, &pager, &shown))
                        .components(controls(&id, &pager, &cats, shown.len())),
                ),
            )
            .await?;
    }

    let shown = pager.select(&all);
    log_err(
        reply
            .edit(
                ctx,
                CreateReply::default()
                    .embed(page_embed(ctx, &pager, &shown))
                    .components(vec![]),
            )
            .await,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> Vec<Command> {
        vec![
            crate::fun::ball(),
            crate::fun::love(),
            crate::purge::purge(),
            crate::power::restart(),
            crate::ping::ping(),
            help(),
        ]
    }

    #[test]
    fn test_usage_marks_optional_arguments() {
        assert_eq!(usage("i.", &crate::fun::love()), "i.love [first] [second]");
        assert_eq!(usage("i.", &crate::purge::purge()), "i.purge <amount>");
        assert_eq!(usage("!", &crate::ping::ping()), "!ping");
        assert_eq!(usage("i.", &crate::modping::helprequest()), "/helprequest");
    }

    #[test]
    fn test_owner_commands_hidden_from_others() {
        let commands = commands();
        let names = |owner| -> Vec<String> {
            catalogue(&commands, owner)
                .iter()
                .map(|c| c.name.clone())
                .collect()
        };
        assert!(!names(false).contains(&"restart".to_string()));
        assert!(names(true).contains(&"restart".to_string()));
    }

    #[test]
    fn test_categories_and_paging() {
        let commands = commands();
        let all = catalogue(&commands, true);
        assert_eq!(categories(&all), vec!["Fun", "Moderation", "Owner", "Utility"]);

        let mut pager = Pager {
            category: None,
            page: 0,
        };
        let total = pager.select(&all).len();
        assert_eq!(Pager::page_count(total), 2);
        pager.next(total);
        pager.next(total);
        assert_eq!(pager.page, 1);

        pager.pick_category("Fun");
        assert_eq!(pager.page, 0);
        let fun: Vec<&str> = pager.select(&all).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(fun, vec!["ball", "love"]);
        pager.prev();
        assert_eq!(pager.page, 0);

        pager.pick_category(ALL);
        assert_eq!(pager.category, None);
        assert_eq!(Pager::page_count(0), 1);
    }
}
