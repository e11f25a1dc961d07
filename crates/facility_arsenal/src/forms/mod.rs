//! Deferred form continuations
//!
//! Модальная форма отвечает через много тиков. За это время мир меняется:
//! игрок вышел, предмет переложили, entity умерла.
//!
//! # Flow
//! 1. `PendingForms::open` - показать форму, сохранить `(ticket, player, continuation)`
//! 2. Каждый тик `poll` опрашивает host:
//!    - `Pending` → ждём
//!    - `Gone` / `Dismissed` → drop без вызова
//!    - `Button(i)` → revalidate всех `WorldHandle` → `resume` только если все живы
//!
//! Continuation никогда не держит ссылок на world - только `WorldHandle`
//! (value описание того, что было захвачено).

use bevy::prelude::*;

use crate::error::{ItemError, ItemResult};
use crate::host::{FormPoll, FormRequest, FormResponse, FormTicket, HostEntity, ItemHost};
use crate::logger;

/// Captured world reference, revalidated before a continuation resumes.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldHandle {
    Entity(HostEntity),
    /// Slot must still hold the same item type with the same edit stamp
    InventorySlot {
        player: HostEntity,
        slot: usize,
        type_id: String,
        edit_stamp: Option<i64>,
    },
    Block { pos: IVec3, kind: String },
}

impl WorldHandle {
    pub fn is_live(&self, host: &dyn ItemHost) -> bool {
        match self {
            WorldHandle::Entity(entity) => host.entity_alive(*entity),
            WorldHandle::InventorySlot {
                player,
                slot,
                type_id,
                edit_stamp,
            } => host
                .inventory_item(*player, *slot)
                .is_some_and(|item| &item.type_id == type_id && item.edit_stamp() == *edit_stamp),
            WorldHandle::Block { pos, kind } => host.block_type(*pos).as_deref() == Some(kind.as_str()),
        }
    }
}

/// Work resumed when the player answers a form.
pub trait FormContinuation: Send + Sync {
    /// Handles that must all be live for `resume` to run.
    fn handles(&self) -> Vec<WorldHandle>;

    /// Called at most once, with the pressed button.
    fn resume(self: Box<Self>, host: &mut dyn ItemHost, player: HostEntity, button: usize) -> ItemResult<()>;

    fn label(&self) -> &str;
}

struct PendingForm {
    ticket: FormTicket,
    player: HostEntity,
    continuation: Box<dyn FormContinuation>,
}

/// What happened to pending forms during one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormPollReport {
    pub resumed: usize,
    /// Dismissed or player gone
    pub dropped: usize,
    /// Answered, but a captured handle went stale (or resume failed)
    pub aborted: usize,
}

/// Resource: forms awaiting an answer.
#[derive(Resource, Default)]
pub struct PendingForms {
    pending: Vec<PendingForm>,
}

impl PendingForms {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_pending_for(&self, player: HostEntity) -> bool {
        self.pending.iter().any(|p| p.player == player)
    }

    /// Show a form and park its continuation.
    pub fn open(
        &mut self,
        host: &mut dyn ItemHost,
        player: HostEntity,
        request: FormRequest,
        continuation: Box<dyn FormContinuation>,
    ) -> ItemResult<FormTicket> {
        let ticket = host.show_form(player, request)?;
        logger::log(&format!(
            "📋 Form {:?} opened for {:?}: {}",
            ticket,
            player,
            continuation.label()
        ));
        self.pending.push(PendingForm {
            ticket,
            player,
            continuation,
        });
        Ok(ticket)
    }

    /// Poll every pending form once.
    pub fn poll(&mut self, host: &mut dyn ItemHost) -> FormPollReport {
        let mut report = FormPollReport::default();
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for form in self.pending.drain(..) {
            match host.poll_form(form.ticket) {
                FormPoll::Pending => still_pending.push(form),
                FormPoll::Gone | FormPoll::Ready(FormResponse::Dismissed) => {
                    report.dropped += 1;
                }
                FormPoll::Ready(FormResponse::Button(button)) => {
                    match Self::resume(host, form, button) {
                        Ok(()) => report.resumed += 1,
                        Err(err) => {
                            logger::log(&format!("⚠️ Form continuation aborted: {}", err));
                            report.aborted += 1;
                        }
                    }
                }
            }
        }

        self.pending = still_pending;
        report
    }

    fn resume(host: &mut dyn ItemHost, form: PendingForm, button: usize) -> ItemResult<()> {
        if let Some(stale) = form
            .continuation
            .handles()
            .into_iter()
            .find(|h| !h.is_live(host))
        {
            return Err(ItemError::StaleHandle(format!(
                "{} (form {:?}): {:?}",
                form.continuation.label(),
                form.ticket,
                stale
            )));
        }
        form.continuation.resume(host, form.player, button)
    }
}
