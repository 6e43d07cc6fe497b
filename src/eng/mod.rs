//! The English learning assistant: AI grammar checks and translation, a word of the day, and a
//! personal vocabulary list.

mod vocab;
pub(crate) mod words;

use poise::serenity_prelude as serenity;
use rand::seq::SliceRandom;
use serenity::{Colour, CreateEmbed, CreateEmbedFooter};

pub(crate) use vocab::{normalize, Saved, VocabStore};

use crate::ai::AiClient;
use crate::config::EMBED_DESCRIPTION_LIMIT;
use crate::error::{invalid, BotError};
use crate::utils::{fit_lines, reply_embed, success, warning, Context, Error};

const CHECK_PROMPT: &str = "You are Ellie, a friendly English teacher for Thai speakers. \
Check the grammar of the English sentence below. If it is already correct, answer with the single \
word CORRECT and nothing else. Otherwise answer in exactly this form:\n\
CORRECTED: <the corrected sentence>\n\
EXPLANATION: <a short, kind explanation of the mistakes, written in Thai>\n\n\
Sentence: ";

const EXAMPLE_PROMPT: &str = "Write one short, natural English example sentence that uses the \
word below. Answer with the sentence only, without quotes or formatting.\n\nWord: ";

const TRANSLATE_PROMPT: &str = "Translate the text below. If it is Thai, translate it into \
natural English; if it is English, translate it into natural Thai. Answer with the translation \
only.\n\nText: ";

const NO_EXAMPLE: &str = "Couldn't come up with an example right now.";

/// What the grammar checker made of a sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Correct,
    Corrected {
        sentence: String,
        explanation: String,
    },
    /// The answer didn't follow the format; shown raw.
    Unparsed(String),
}

pub(crate) fn parse_verdict(answer: &str) -> Verdict {
    let answer = answer.trim();
    if let Some((head, explanation)) = answer.split_once("EXPLANATION:") {
        if let Some((_, sentence)) = head.split_once("CORRECTED:") {
            return Verdict::Corrected {
                sentence: sentence.trim().to_string(),
                explanation: explanation.trim().to_string(),
            };
        }
    }
    if answer.eq_ignore_ascii_case("correct") {
        Verdict::Correct
    } else {
        Verdict::Unparsed(answer.to_string())
    }
}

fn ai(ctx: Context<'_>) -> Result<&AiClient, Error> {
    ctx.data()
        .ai
        .as_ref()
        .ok_or_else(|| BotError::AiDisabled.into())
}

async fn ask(ctx: Context<'_>, prompt: String) -> Result<String, Error> {
    ai(ctx)?.generate(&prompt).await.map_err(|e| {
        tracing::warn!("AI request failed: {}", e);
        BotError::External("Sorry, I couldn't talk to the AI service. Please try again later.".into())
            .into()
    })
}

fn powered_by(ctx: Context<'_>) -> CreateEmbedFooter {
    CreateEmbedFooter::new(format!(
        "Powered by Google Generative AI | for {}",
        ctx.author().name
    ))
}

/// English learning commands.
#[poise::command(
    prefix_command,
    category = "English Learning",
    subcommands("check", "word", "translate", "vocab")
)]
pub(crate) async fn eng(ctx: Context<'_>) -> Result<(), Error> {
    reply_embed(ctx, crate::help::command_embed(ctx.prefix(), ctx.command())).await?;
    Ok(())
}

/// Checks the grammar of an English sentence.
#[poise::command(prefix_command, aliases("check_grammar"))]
async fn check(
    ctx: Context<'_>,
    #[description = "An English sentence"]
    #[rest]
    sentence: String,
) -> Result<(), Error> {
    ai(ctx)?;
    ctx.defer_or_broadcast().await?;
    let answer = ask(ctx, format!("{}{}", CHECK_PROMPT, sentence)).await?;

    let mut embed = CreateEmbed::new()
        .title("✔️ Grammar Check")
        .field("Your sentence", format!("```{}```", sentence), false)
        .footer(powered_by(ctx));
    embed = match parse_verdict(&answer) {
        Verdict::Correct => embed
            .description("✅ Your sentence is already correct. Great job!")
            .colour(Colour::DARK_GREEN),
        Verdict::Corrected {
            sentence,
            explanation,
        } => embed
            .field("Corrected", format!("```{}```", sentence), false)
            .field("Explanation", explanation, false)
            .colour(Colour::ORANGE),
        Verdict::Unparsed(raw) => embed
            .field("AI answer", format!("```\n{}\n```", raw), false)
            .colour(Colour::LIGHT_GREY),
    };
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// A random word with its Thai meaning and an example sentence.
#[poise::command(prefix_command, aliases("daily_word"))]
async fn word(ctx: Context<'_>) -> Result<(), Error> {
    ai(ctx)?;
    let picked = ctx
        .data()
        .words
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| invalid("The word list is empty."))?;
    ctx.defer_or_broadcast().await?;

    let example = match ask(ctx, format!("{}{}", EXAMPLE_PROMPT, picked.eng)).await {
        Ok(text) => text.replace('*', ""),
        Err(_) => NO_EXAMPLE.to_string(),
    };
    let embed = CreateEmbed::new()
        .title(format!("Word of the Day: {}", title_case(&picked.eng)))
        .description(format!("**{}**", picked.def))
        .colour(Colour::PURPLE)
        .field("Thai meaning", &picked.thai, true)
        .field("Example", format!("```{}```", example), false)
        .footer(CreateEmbedFooter::new(format!(
            "Use {}eng vocab save {} to save this word!",
            ctx.prefix(),
            picked.eng
        )));
    reply_embed(ctx, embed).await?;
    Ok(())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Translates between Thai and English.
#[poise::command(prefix_command)]
async fn translate(
    ctx: Context<'_>,
    #[description = "Thai or English text"]
    #[rest]
    text: String,
) -> Result<(), Error> {
    ai(ctx)?;
    ctx.defer_or_broadcast().await?;
    let translated = ask(ctx, format!("{}{}", TRANSLATE_PROMPT, text)).await?;
    let embed = CreateEmbed::new()
        .title("🌐 Translation")
        .colour(Colour::DARK_TEAL)
        .field("Original", format!("```{}```", text), false)
        .field("Translation", format!("```{}```", translated), false)
        .footer(powered_by(ctx));
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Your personal vocabulary list.
#[poise::command(prefix_command, subcommands("save", "list"))]
async fn vocab(ctx: Context<'_>) -> Result<(), Error> {
    reply_embed(ctx, crate::help::command_embed(ctx.prefix(), ctx.command())).await?;
    Ok(())
}

/// Saves a word to your list.
#[poise::command(prefix_command)]
async fn save(
    ctx: Context<'_>,
    #[description = "The word to save"]
    #[rest]
    word: String,
) -> Result<(), Error> {
    let word = normalize(&word).ok_or_else(|| invalid("Tell me which word to save."))?;
    match ctx.data().vocab.save(ctx.author().id, &word).await? {
        Saved::New(word) => {
            let embed = success(
                "📖 Word Saved",
                format!("Saved `{}` to your vocabulary list.", word),
            )
            .footer(CreateEmbedFooter::new(format!(
                "Use {}eng vocab list to see all your words",
                ctx.prefix()
            )));
            reply_embed(ctx, embed).await?;
        }
        Saved::AlreadySaved(word) => {
            reply_embed(
                ctx,
                warning("Already Saved", format!("You've already saved `{}`.", word)),
            )
            .await?;
        }
    }
    Ok(())
}

/// Lists the words you've saved.
#[poise::command(prefix_command, aliases("show"))]
async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let words = ctx.data().vocab.list(ctx.author().id).await?;
    if words.is_empty() {
        reply_embed(
            ctx,
            warning(
                "No Words Yet",
                format!(
                    "You haven't saved any words yet. Try `{}eng vocab save <word>`!",
                    ctx.prefix()
                ),
            ),
        )
        .await?;
        return Ok(());
    }
    let listing: Vec<String> = words.iter().map(|w| format!("• {}", w)).collect();
    let embed = CreateEmbed::new()
        .title(format!("{}'s Vocabulary", ctx.author().name))
        .description(fit_lines(&listing, EMBED_DESCRIPTION_LIMIT))
        .colour(Colour::DARK_PURPLE);
    reply_embed(ctx, embed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corrected() {
        let answer = "CORRECTED: She goes to school.\nEXPLANATION: ใช้ goes กับประธานเอกพจน์";
        assert_eq!(
            parse_verdict(answer),
            Verdict::Corrected {
                sentence: "She goes to school.".into(),
                explanation: "ใช้ goes กับประธานเอกพจน์".into(),
            }
        );
    }

    #[test]
    fn test_parse_correct() {
        assert_eq!(parse_verdict("CORRECT"), Verdict::Correct);
        assert_eq!(parse_verdict("  correct\n"), Verdict::Correct);
    }

    #[test]
    fn test_parse_unformatted() {
        assert_eq!(
            parse_verdict("Looks fine to me!"),
            Verdict::Unparsed("Looks fine to me!".into())
        );
        // an explanation without a correction isn't the agreed format
        assert!(matches!(
            parse_verdict("EXPLANATION: hmm"),
            Verdict::Unparsed(_)
        ));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("ubiquitous"), "Ubiquitous");
        assert_eq!(title_case(""), "");
    }
}
