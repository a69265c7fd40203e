//! Display selection and whiteboard sessions.

use super::messages::WhiteboardInfo;
use super::room::RoomActor;
use crate::display::{self, DisplayKind, DisplayPointer};
use crate::errors::RoomError;
use crate::notifications::{Delivery, Notification};
use crate::roles;
use crate::store::WhiteboardRecord;
use chrono::Utc;
use ring::digest;
use tracing::info;

/// Stable numeric label for a whiteboard, derived from its creator and id.
#[must_use]
pub fn whiteboard_name(creator_id: &str, whiteboard_id: &str) -> String {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(creator_id.as_bytes());
    ctx.update(whiteboard_id.as_bytes());
    let hash = ctx.finish();
    let head = hash
        .as_ref()
        .get(..4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map_or(0, u32::from_be_bytes);
    (head & 0x7fff_ffff).to_string()
}

impl RoomActor {
    pub(super) async fn handle_set_display(
        &mut self,
        actor_id: &str,
        kind: DisplayKind,
        reference: Option<&str>,
    ) -> Result<DisplayPointer, RoomError> {
        self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::STAFF, "set display")?;
        let whiteboards = self.services.store.list_whiteboards(&self.room_id).await?;

        let pointer = display::resolve(kind, reference, &members, &whiteboards)?;
        self.commit_display(actor_id, &pointer, Delivery::Required).await?;
        Ok(pointer)
    }

    pub(super) async fn handle_create_whiteboard(
        &mut self,
        actor_id: &str,
    ) -> Result<WhiteboardInfo, RoomError> {
        self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::STAFF, "create whiteboard")?;

        let session_token = uuid::Uuid::new_v4().to_string();
        let whiteboard_id = self.services.whiteboards.create(&session_token).await?;
        let record = WhiteboardRecord {
            name: whiteboard_name(actor_id, &whiteboard_id),
            whiteboard_id,
            room_id: self.room_id.clone(),
            creator_id: actor_id.to_string(),
            session_token,
            current_page: 0,
            created_at: Utc::now(),
        };
        self.services
            .store
            .insert_whiteboard(record.clone())
            .await?;

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            whiteboard_id = %record.whiteboard_id,
            "Whiteboard created"
        );

        self.broadcast(
            actor_id,
            Notification::WhiteboardCreated {
                whiteboard_id: record.whiteboard_id.clone(),
                name: record.name.clone(),
            },
            Delivery::BestEffort,
        )
        .await?;

        let pointer = DisplayPointer::Whiteboard {
            whiteboard_id: record.whiteboard_id.clone(),
            presenter_id: Some(actor_id.to_string()),
        };
        self.commit_display(actor_id, &pointer, Delivery::BestEffort).await?;

        Ok(WhiteboardInfo::from(&record))
    }

    pub(super) async fn handle_delete_whiteboard(
        &mut self,
        actor_id: &str,
        whiteboard_id: &str,
    ) -> Result<(), RoomError> {
        let room = self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::STAFF, "delete whiteboard")?;
        let whiteboard = self
            .services
            .store
            .get_whiteboard(&self.room_id, whiteboard_id)
            .await?
            .ok_or_else(|| RoomError::WhiteboardNotFound(whiteboard_id.to_string()))?;

        if let Some(next) = display::after_whiteboard_deleted(&room.display, whiteboard_id) {
            self.commit_display(actor_id, &next, Delivery::BestEffort).await?;
        }

        self.services
            .whiteboards
            .destroy(&whiteboard.session_token)
            .await?;
        self.services
            .store
            .delete_whiteboard(&self.room_id, whiteboard_id)
            .await?;

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            whiteboard_id = %whiteboard_id,
            "Whiteboard deleted"
        );

        self.broadcast(
            actor_id,
            Notification::WhiteboardDeleted {
                whiteboard_id: whiteboard_id.to_string(),
            },
            Delivery::BestEffort,
        )
        .await
    }

    pub(super) async fn handle_turn_page(
        &mut self,
        actor_id: &str,
        whiteboard_id: &str,
        page: u32,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::SEATED, "turn page")?;

        let found = self
            .services
            .store
            .set_whiteboard_page(&self.room_id, whiteboard_id, page)
            .await?;
        if !found {
            return Err(RoomError::WhiteboardNotFound(whiteboard_id.to_string()));
        }

        self.broadcast(
            actor_id,
            Notification::PageTurned {
                whiteboard_id: whiteboard_id.to_string(),
                user_id: actor_id.to_string(),
                page,
            },
            Delivery::BestEffort,
        )
        .await
    }

    pub(super) async fn handle_list_whiteboards(&self) -> Result<Vec<WhiteboardInfo>, RoomError> {
        self.room().await?;
        Ok(self
            .services
            .store
            .list_whiteboards(&self.room_id)
            .await?
            .iter()
            .map(WhiteboardInfo::from)
            .collect())
    }
}
