//! Message routing: owner/admin command handling and customer lead capture.
//! Every mutating path goes through the shared authorization predicate; all
//! multi-step flows live in TTL sessions, never in globals.

use std::sync::Arc;

use postpilot_core::error::Result;
use postpilot_core::traits::Publisher;
use postpilot_core::types::{ContentType, IncomingMessage};
use postpilot_engine::intake::{IncomingLead, IntakeOutcome};
use postpilot_engine::{LeadIntake, PostingDispatcher, SessionStore};
use postpilot_store::{
    AdminRegistry, Authorizer, ContentStore, LeadStore, ScheduleStore, SettingsStore, parse_time,
};

/// Pending lead attribution, set by a deep link or a shared contact.
#[derive(Debug, Clone, Default)]
pub struct LeadContext {
    pub source_content_id: Option<i64>,
    pub phone: Option<String>,
}

/// Admin flows awaiting the next message.
#[derive(Debug, Clone, Copy)]
pub enum PendingFlow {
    AwaitScheduleTime,
    AwaitTargetChat,
    AwaitAdminChat,
    AwaitPost,
}

/// Everything the router needs, built once at startup.
pub struct Context {
    pub settings: SettingsStore,
    pub schedules: ScheduleStore,
    pub content: ContentStore,
    pub leads: LeadStore,
    pub registry: AdminRegistry,
    pub authorizer: Authorizer,
    pub dispatcher: Arc<PostingDispatcher>,
    pub publisher: Arc<dyn Publisher>,
    pub intake: LeadIntake,
    pub lead_sources: SessionStore<LeadContext>,
    pub pending_flows: SessionStore<PendingFlow>,
}

impl Context {
    /// Best-effort reply; a failed reply is logged, never fatal.
    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.publisher.send_text(chat_id, text).await {
            tracing::warn!("Reply to chat {chat_id} failed: {e}");
        }
    }
}

/// Entry point for every decoded update.
pub async fn route_message(ctx: &Context, msg: &IncomingMessage) -> Result<()> {
    if !msg.is_private {
        return Ok(());
    }
    if ctx.authorizer.is_authorized(msg.sender_id)? {
        handle_admin(ctx, msg).await
    } else {
        handle_customer(ctx, msg).await
    }
}

// ── Customer side ──────────────────────────────────────

async fn handle_customer(ctx: &Context, msg: &IncomingMessage) -> Result<()> {
    // Deep link from a button under a published post: remember which
    // content brought the user here, greet, and wait for their message.
    if let Some(link) = msg.deep_link.as_deref() {
        let source = link.strip_prefix("post_").and_then(|s| s.parse::<i64>().ok());
        if let Some(content_id) = source {
            ctx.lead_sources.put(
                msg.sender_id,
                LeadContext {
                    source_content_id: Some(content_id),
                    phone: None,
                },
            );
        }
        ctx.reply(msg.chat_id, "Welcome! Write your question and our team will get back to you.")
            .await;
        return Ok(());
    }
    if msg.text == "/start" {
        ctx.reply(msg.chat_id, "Welcome! Write your question and our team will get back to you.")
            .await;
        return Ok(());
    }

    // Shared contact without text: keep the phone for the next message.
    if msg.text.is_empty() {
        if let Some(phone) = msg.phone.clone() {
            let mut lead_ctx = ctx.lead_sources.take(msg.sender_id).unwrap_or_default();
            lead_ctx.phone = Some(phone);
            ctx.lead_sources.put(msg.sender_id, lead_ctx);
            ctx.reply(msg.chat_id, "Got your number — now write your question.")
                .await;
        }
        return Ok(());
    }

    let lead_ctx = ctx.lead_sources.take(msg.sender_id).unwrap_or_default();
    let outcome = ctx
        .intake
        .handle_message(IncomingLead {
            telegram_user_id: msg.sender_id,
            username: msg.username.clone(),
            first_name: msg.sender_name.clone(),
            last_name: None,
            text: msg.text.clone(),
            source_content_id: lead_ctx.source_content_id,
            phone: msg.phone.clone().or(lead_ctx.phone),
        })
        .await?;

    let ack = match outcome {
        IntakeOutcome::RateLimited => {
            "You are sending messages too often. Please try again a bit later."
        }
        IntakeOutcome::Routed { .. } => "Thanks! Your message was passed to our team.",
        IntakeOutcome::StoredOnly { .. } => {
            "Thanks! Your message was received; an admin will contact you soon."
        }
    };
    ctx.reply(msg.chat_id, ack).await;
    Ok(())
}

// ── Admin side ──────────────────────────────────────

const HELP: &str = "Commands:\n\
    /status — posting state and targets\n\
    /posting on|off — global posting switch\n\
    /addpost — save the next message as content\n\
    /history — recent content with last-posted times\n\
    /delpost <id> | /restore <id> — soft delete / restore\n\
    /enable <id> | /disable <id> — publishing toggle\n\
    /postnow <id> — publish immediately\n\
    /addtime [HH:MM] | /deltime HH:MM | /times — posting slots\n\
    /bind <time-id> <post-id> — assign content to a slot\n\
    /settarget [chat-id] | /setleads [chat-id] — targets\n\
    /leads — unanswered leads\n\
    /take <id> | /done <id> — claim / close a lead\n\
    /admins | /addadmin <id> | /deladmin <id> — admin list (owner)";

async fn handle_admin(ctx: &Context, msg: &IncomingMessage) -> Result<()> {
    let text = msg.text.trim();

    if !text.starts_with('/') {
        if let Some(flow) = ctx.pending_flows.take(msg.sender_id) {
            return finish_flow(ctx, msg, flow).await;
        }
        if msg.photo_file_id.is_some() || msg.video_file_id.is_some() {
            ctx.reply(msg.chat_id, "Use /addpost first, then send the media.")
                .await;
        } else {
            ctx.reply(msg.chat_id, HELP).await;
        }
        return Ok(());
    }

    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match (command, args.as_slice()) {
        ("/start" | "/help", _) => ctx.reply(msg.chat_id, HELP).await,

        ("/status", _) => {
            let posting = ctx.settings.posting_enabled()?;
            let target = ctx.settings.target_chat_id()?;
            let admin_chat = ctx.settings.admin_chat_id()?;
            let slots = ctx.schedules.list()?.len();
            ctx.reply(
                msg.chat_id,
                &format!(
                    "Posting: {}\nTarget chat: {}\nLeads chat: {}\nSlots: {slots}",
                    if posting { "on" } else { "off" },
                    target.map(|id| id.to_string()).unwrap_or_else(|| "not set".into()),
                    admin_chat.map(|id| id.to_string()).unwrap_or_else(|| "not set".into()),
                ),
            )
            .await;
        }

        ("/posting", ["on"]) => {
            ctx.settings.set_posting_enabled(true)?;
            ctx.reply(msg.chat_id, "Posting enabled.").await;
        }
        ("/posting", ["off"]) => {
            ctx.settings.set_posting_enabled(false)?;
            ctx.reply(msg.chat_id, "Posting disabled.").await;
        }

        ("/addpost", _) => {
            ctx.pending_flows.put(msg.sender_id, PendingFlow::AwaitPost);
            ctx.reply(msg.chat_id, "Send the post now: a photo, a video, or plain text.")
                .await;
        }

        ("/history", _) => {
            let items = ctx.content.list_history(10)?;
            if items.is_empty() {
                ctx.reply(msg.chat_id, "No content yet.").await;
                return Ok(());
            }
            let ids: Vec<i64> = items.iter().map(|c| c.id).collect();
            let last_posted = ctx.content.last_published_at(&ids)?;
            let lines: Vec<String> = items
                .iter()
                .map(|c| {
                    format!(
                        "#{} {} [{}]{} — last posted: {}",
                        c.id,
                        c.content_type.as_str(),
                        c.status.as_str(),
                        if c.publishing_enabled { "" } else { " (publishing off)" },
                        last_posted
                            .get(&c.id)
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "never".into()),
                    )
                })
                .collect();
            ctx.reply(msg.chat_id, &lines.join("\n")).await;
        }

        ("/delpost", [id]) => {
            let done = parse_id(id).map(|id| ctx.content.soft_delete(id)).transpose()?;
            reply_done(ctx, msg, done, "Deleted.", "No such active post.").await;
        }
        ("/restore", [id]) => {
            let done = parse_id(id).map(|id| ctx.content.reactivate(id)).transpose()?;
            reply_done(ctx, msg, done, "Restored.", "No such deleted post.").await;
        }
        ("/enable", [id]) => {
            let done = parse_id(id)
                .map(|id| ctx.content.set_publishing_enabled(id, true))
                .transpose()?;
            reply_done(ctx, msg, done, "Publishing on.", "No such post.").await;
        }
        ("/disable", [id]) => {
            let done = parse_id(id)
                .map(|id| ctx.content.set_publishing_enabled(id, false))
                .transpose()?;
            reply_done(ctx, msg, done, "Publishing off.", "No such post.").await;
        }

        ("/postnow", [id]) => {
            let posted = match parse_id(id) {
                Some(content_id) => ctx.dispatcher.post_now(content_id).await?,
                None => false,
            };
            reply_done(
                ctx,
                msg,
                Some(posted),
                "Published.",
                "Not published — check the target chat and the post state.",
            )
            .await;
        }

        ("/addtime", []) => {
            ctx.pending_flows
                .put(msg.sender_id, PendingFlow::AwaitScheduleTime);
            ctx.reply(msg.chat_id, "Send the time as HH:MM.").await;
        }
        ("/addtime", [time]) => add_schedule(ctx, msg, time).await?,
        ("/deltime", [time]) => {
            let done = ctx.schedules.remove(time)?;
            reply_done(ctx, msg, Some(done), "Slot removed.", "No such slot.").await;
        }
        ("/times", _) => {
            let slots = ctx.schedules.list()?;
            if slots.is_empty() {
                ctx.reply(msg.chat_id, "No posting slots yet. Use /addtime.").await;
                return Ok(());
            }
            let mut lines = Vec::with_capacity(slots.len());
            for s in &slots {
                let bound = ctx.schedules.bound_content(s.id)?;
                lines.push(format!(
                    "#{} {} {}{}",
                    s.id,
                    s.time_str,
                    if s.enabled { "" } else { "(off) " },
                    bound
                        .map(|id| format!("→ post #{id}"))
                        .unwrap_or_else(|| "— unassigned".into()),
                ));
            }
            ctx.reply(msg.chat_id, &lines.join("\n")).await;
        }

        ("/bind", [schedule_id, content_id]) => {
            let done = match (parse_id(schedule_id), parse_id(content_id)) {
                (Some(sid), Some(cid)) => ctx.schedules.bind_content(sid, cid)?,
                _ => false,
            };
            reply_done(ctx, msg, Some(done), "Assigned.", "No such slot.").await;
        }

        ("/settarget", []) => {
            ctx.pending_flows
                .put(msg.sender_id, PendingFlow::AwaitTargetChat);
            ctx.reply(msg.chat_id, "Send the target chat id (e.g. -1001234567890).")
                .await;
        }
        ("/settarget", [id]) => set_chat(ctx, msg, id, PendingFlow::AwaitTargetChat).await?,
        ("/setleads", []) => {
            ctx.pending_flows
                .put(msg.sender_id, PendingFlow::AwaitAdminChat);
            ctx.reply(msg.chat_id, "Send the leads chat id.").await;
        }
        ("/setleads", [id]) => set_chat(ctx, msg, id, PendingFlow::AwaitAdminChat).await?,

        ("/leads", _) => {
            let leads = ctx.leads.list_unanswered(10)?;
            if leads.is_empty() {
                ctx.reply(msg.chat_id, "No unanswered leads.").await;
                return Ok(());
            }
            let lines: Vec<String> = leads
                .iter()
                .map(|l| {
                    format!(
                        "#{} [{}] {}: {}",
                        l.id,
                        l.status.as_str(),
                        l.taken_by
                            .map(|id| format!("taken by {id}"))
                            .unwrap_or_else(|| "free".into()),
                        l.message_text,
                    )
                })
                .collect();
            ctx.reply(msg.chat_id, &lines.join("\n")).await;
        }

        ("/take", [id]) => {
            let taken = match parse_id(id) {
                Some(lead_id) => ctx.leads.take(lead_id, msg.sender_id)?,
                None => false,
            };
            reply_done(
                ctx,
                msg,
                Some(taken),
                "The lead is yours.",
                "Already taken or unknown lead.",
            )
            .await;
        }
        ("/done", [id]) => {
            let done = match parse_id(id) {
                Some(lead_id) => ctx.leads.mark_answered(lead_id, msg.sender_id)?,
                None => false,
            };
            reply_done(ctx, msg, Some(done), "Marked answered.", "Unknown lead.").await;
        }

        ("/admins", _) => {
            let admins = ctx.registry.list()?;
            if admins.is_empty() {
                ctx.reply(msg.chat_id, "No admins registered.").await;
                return Ok(());
            }
            let lines: Vec<String> = admins
                .iter()
                .map(|a| {
                    format!(
                        "{} {}",
                        a.telegram_id,
                        a.username.as_deref().map(|u| format!("@{u}")).unwrap_or_default(),
                    )
                })
                .collect();
            ctx.reply(msg.chat_id, &lines.join("\n")).await;
        }
        ("/addadmin", [id]) => {
            if !ctx.authorizer.is_owner(msg.sender_id) {
                ctx.reply(msg.chat_id, "Owner only.").await;
                return Ok(());
            }
            let done = match parse_id(id) {
                Some(tid) => ctx.registry.add(tid, None, None, None)?,
                None => false,
            };
            reply_done(ctx, msg, Some(done), "Admin added.", "Already an admin.").await;
        }
        ("/deladmin", [id]) => {
            if !ctx.authorizer.is_owner(msg.sender_id) {
                ctx.reply(msg.chat_id, "Owner only.").await;
                return Ok(());
            }
            let done = match parse_id(id) {
                Some(tid) => ctx.registry.remove(tid)?,
                None => false,
            };
            reply_done(ctx, msg, Some(done), "Admin removed.", "Not an admin.").await;
        }

        _ => ctx.reply(msg.chat_id, HELP).await,
    }
    Ok(())
}

/// Second step of a two-message flow.
async fn finish_flow(ctx: &Context, msg: &IncomingMessage, flow: PendingFlow) -> Result<()> {
    match flow {
        PendingFlow::AwaitScheduleTime => add_schedule(ctx, msg, msg.text.trim()).await,
        PendingFlow::AwaitTargetChat | PendingFlow::AwaitAdminChat => {
            set_chat(ctx, msg, msg.text.trim(), flow).await
        }
        PendingFlow::AwaitPost => {
            let caption = msg.caption.as_deref();
            let created = if let Some(file_id) = msg.photo_file_id.as_deref() {
                Some(ctx.content.add(ContentType::Photo, msg.sender_id, Some(file_id), None, caption)?)
            } else if let Some(file_id) = msg.video_file_id.as_deref() {
                Some(ctx.content.add(ContentType::Video, msg.sender_id, Some(file_id), None, caption)?)
            } else if !msg.text.trim().is_empty() {
                Some(ctx.content.add(ContentType::Text, msg.sender_id, None, Some(msg.text.trim()), None)?)
            } else {
                None
            };
            match created {
                Some(c) => {
                    ctx.reply(
                        msg.chat_id,
                        &format!("Saved as post #{}. Use /bind to put it on a slot.", c.id),
                    )
                    .await
                }
                None => {
                    ctx.reply(msg.chat_id, "That message is empty — send a photo, video, or text.")
                        .await
                }
            }
            Ok(())
        }
    }
}

async fn add_schedule(ctx: &Context, msg: &IncomingMessage, time: &str) -> Result<()> {
    if parse_time(time).is_none() {
        ctx.reply(msg.chat_id, "That is not a valid HH:MM time.").await;
        return Ok(());
    }
    match ctx.schedules.add(time)? {
        Some(id) => {
            ctx.reply(msg.chat_id, &format!("Slot #{id} added. Use /bind {id} <post-id>."))
                .await
        }
        None => ctx.reply(msg.chat_id, "That time already exists.").await,
    }
    Ok(())
}

async fn set_chat(ctx: &Context, msg: &IncomingMessage, raw: &str, flow: PendingFlow) -> Result<()> {
    let Ok(chat_id) = raw.parse::<i64>() else {
        ctx.reply(msg.chat_id, "That is not a chat id.").await;
        return Ok(());
    };
    match flow {
        PendingFlow::AwaitAdminChat => {
            ctx.settings.set_admin_chat_id(chat_id)?;
            ctx.reply(msg.chat_id, "Leads chat saved.").await;
        }
        _ => {
            ctx.settings.set_target_chat_id(chat_id)?;
            ctx.reply(msg.chat_id, "Target chat saved.").await;
        }
    }
    Ok(())
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().trim_start_matches('#').parse().ok()
}

async fn reply_done(
    ctx: &Context,
    msg: &IncomingMessage,
    outcome: Option<bool>,
    ok_text: &str,
    fail_text: &str,
) {
    match outcome {
        Some(true) => ctx.reply(msg.chat_id, ok_text).await,
        Some(false) => ctx.reply(msg.chat_id, fail_text).await,
        None => ctx.reply(msg.chat_id, "That is not a numeric id.").await,
    }
}
