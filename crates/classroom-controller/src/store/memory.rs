//! In-process [`RoomStore`].

use super::{MemberRecord, RoomRecord, RoomStore, WhiteboardRecord};
use crate::display::DisplayPointer;
use crate::errors::RoomError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    rooms: HashMap<String, RoomRecord>,
    members: HashMap<String, Vec<MemberRecord>>,
    whiteboards: HashMap<String, Vec<WhiteboardRecord>>,
}

/// Room store held in memory. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    tables: RwLock<Tables>,
}

impl InMemoryRoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms currently stored.
    pub async fn room_count(&self) -> usize {
        self.tables.read().await.rooms.len()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert_room_if_absent(&self, room: RoomRecord) -> Result<bool, RoomError> {
        let mut tables = self.tables.write().await;
        if tables.rooms.contains_key(&room.room_id) {
            return Ok(false);
        }
        tables.rooms.insert(room.room_id.clone(), room);
        Ok(true)
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, RoomError> {
        Ok(self.tables.read().await.rooms.get(room_id).cloned())
    }

    async fn set_display(&self, room_id: &str, display: DisplayPointer) -> Result<(), RoomError> {
        let mut tables = self.tables.write().await;
        let room = tables
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        room.display = display;
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, RoomError> {
        Ok(self.tables.write().await.rooms.remove(room_id).is_some())
    }

    async fn insert_member_if_absent(&self, member: MemberRecord) -> Result<bool, RoomError> {
        let mut tables = self.tables.write().await;
        let members = tables.members.entry(member.room_id.clone()).or_default();
        if members.iter().any(|m| m.user_id == member.user_id) {
            return Ok(false);
        }
        members.push(member);
        Ok(true)
    }

    async fn get_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRecord>, RoomError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .get(room_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id))
            .cloned())
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<MemberRecord>, RoomError> {
        let tables = self.tables.read().await;
        Ok(tables.members.get(room_id).cloned().unwrap_or_default())
    }

    async fn update_member(&self, member: &MemberRecord) -> Result<(), RoomError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .members
            .get_mut(&member.room_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == member.user_id))
            .ok_or_else(|| RoomError::MemberNotFound(member.user_id.clone()))?;
        *existing = member.clone();
        Ok(())
    }

    async fn delete_member(&self, room_id: &str, user_id: &str) -> Result<bool, RoomError> {
        let mut tables = self.tables.write().await;
        let Some(members) = tables.members.get_mut(room_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|m| m.user_id != user_id);
        let removed = members.len() != before;
        if members.is_empty() {
            tables.members.remove(room_id);
        }
        Ok(removed)
    }

    async fn delete_members(&self, room_id: &str) -> Result<usize, RoomError> {
        let mut tables = self.tables.write().await;
        Ok(tables.members.remove(room_id).map_or(0, |m| m.len()))
    }

    async fn insert_whiteboard(&self, whiteboard: WhiteboardRecord) -> Result<(), RoomError> {
        let mut tables = self.tables.write().await;
        tables
            .whiteboards
            .entry(whiteboard.room_id.clone())
            .or_default()
            .push(whiteboard);
        Ok(())
    }

    async fn get_whiteboard(
        &self,
        room_id: &str,
        whiteboard_id: &str,
    ) -> Result<Option<WhiteboardRecord>, RoomError> {
        let tables = self.tables.read().await;
        Ok(tables
            .whiteboards
            .get(room_id)
            .and_then(|boards| boards.iter().find(|w| w.whiteboard_id == whiteboard_id))
            .cloned())
    }

    async fn list_whiteboards(&self, room_id: &str) -> Result<Vec<WhiteboardRecord>, RoomError> {
        let tables = self.tables.read().await;
        Ok(tables.whiteboards.get(room_id).cloned().unwrap_or_default())
    }

    async fn set_whiteboard_page(
        &self,
        room_id: &str,
        whiteboard_id: &str,
        page: u32,
    ) -> Result<bool, RoomError> {
        let mut tables = self.tables.write().await;
        match tables
            .whiteboards
            .get_mut(room_id)
            .and_then(|boards| boards.iter_mut().find(|w| w.whiteboard_id == whiteboard_id))
        {
            Some(board) => {
                board.current_page = page;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_whiteboard(
        &self,
        room_id: &str,
        whiteboard_id: &str,
    ) -> Result<bool, RoomError> {
        let mut tables = self.tables.write().await;
        let Some(boards) = tables.whiteboards.get_mut(room_id) else {
            return Ok(false);
        };
        let before = boards.len();
        boards.retain(|w| w.whiteboard_id != whiteboard_id);
        Ok(boards.len() != before)
    }

    async fn delete_whiteboards(&self, room_id: &str) -> Result<Vec<WhiteboardRecord>, RoomError> {
        let mut tables = self.tables.write().await;
        Ok(tables.whiteboards.remove(room_id).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::roles::{DeviceType, Role};
    use chrono::Utc;

    fn member(room_id: &str, user_id: &str, role: Role) -> MemberRecord {
        MemberRecord {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: format!("name-{user_id}"),
            role,
            camera_enabled: true,
            mic_enabled: true,
            joined_at: Utc::now(),
        }
    }

    fn whiteboard(room_id: &str, id: &str) -> WhiteboardRecord {
        WhiteboardRecord {
            whiteboard_id: id.to_string(),
            room_id: room_id.to_string(),
            creator_id: "t".to_string(),
            session_token: format!("tok-{id}"),
            name: "1".to_string(),
            current_page: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_room_insert_if_absent() {
        let store = InMemoryRoomStore::new();
        assert!(store.insert_room_if_absent(RoomRecord::new("r1")).await.unwrap());
        assert!(!store.insert_room_if_absent(RoomRecord::new("r1")).await.unwrap());
        assert_eq!(store.room_count().await, 1);

        store
            .set_display(
                "r1",
                DisplayPointer::Teacher {
                    user_id: "t".to_string(),
                },
            )
            .await
            .unwrap();
        let room = store.get_room("r1").await.unwrap().unwrap();
        assert_eq!(room.display.owner_id(), Some("t"));

        assert!(store.delete_room("r1").await.unwrap());
        assert!(store.get_room("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_display_on_missing_room() {
        let store = InMemoryRoomStore::new();
        let result = store.set_display("nope", DisplayPointer::None).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_member_crud() {
        let store = InMemoryRoomStore::new();
        assert!(store
            .insert_member_if_absent(member("r1", "a", Role::Assistant))
            .await
            .unwrap());
        assert!(!store
            .insert_member_if_absent(member("r1", "a", Role::Student))
            .await
            .unwrap());
        store
            .insert_member_if_absent(member("r1", "b", Role::Student))
            .await
            .unwrap();

        let mut b = store.get_member("r1", "b").await.unwrap().unwrap();
        b.set_device(DeviceType::Camera, false);
        b.role = Role::Audience;
        store.update_member(&b).await.unwrap();

        let listed = store.list_members("r1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(listed.get(1).unwrap().role, Role::Audience);
        assert!(!listed.get(1).unwrap().camera_enabled);

        assert!(store.delete_member("r1", "a").await.unwrap());
        assert!(!store.delete_member("r1", "a").await.unwrap());
        assert_eq!(store.delete_members("r1").await.unwrap(), 1);
        assert!(store.list_members("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_member() {
        let store = InMemoryRoomStore::new();
        let result = store.update_member(&member("r1", "ghost", Role::Student)).await;
        assert!(matches!(result, Err(RoomError::MemberNotFound(_))));
    }

    #[tokio::test]
    async fn test_whiteboard_crud() {
        let store = InMemoryRoomStore::new();
        store.insert_whiteboard(whiteboard("r1", "w1")).await.unwrap();
        store.insert_whiteboard(whiteboard("r1", "w2")).await.unwrap();
        store.insert_whiteboard(whiteboard("r2", "w3")).await.unwrap();

        assert!(store.set_whiteboard_page("r1", "w1", 4).await.unwrap());
        assert!(!store.set_whiteboard_page("r1", "w3", 4).await.unwrap());
        assert_eq!(
            store
                .get_whiteboard("r1", "w1")
                .await
                .unwrap()
                .unwrap()
                .current_page,
            4
        );

        assert!(store.delete_whiteboard("r1", "w2").await.unwrap());
        let removed = store.delete_whiteboards("r1").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.list_whiteboards("r2").await.unwrap().len(), 1);
    }
}
