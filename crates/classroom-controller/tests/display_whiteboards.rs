//! Integration tests for the display pointer and whiteboard sessions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use classroom_controller::actors::whiteboard_name;
use classroom_controller::display::{DisplayKind, DisplayPointer};
use classroom_controller::errors::RoomError;
use classroom_controller::roles::Role;
use classroom_test_utils::TestClassroom;

const ROOM: &str = "room-1";

// ============================================================================
// Set display
// ============================================================================

#[tokio::test]
async fn test_set_display_resolves_each_kind() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();

    assert_eq!(
        classroom
            .controller
            .set_display(ROOM, &alice.user_id, DisplayKind::Teacher, None)
            .await,
        Err(RoomError::TeacherNotFound)
    );

    let pointer = classroom
        .controller
        .set_display(ROOM, &alice.user_id, DisplayKind::Screen, Some(&bob.user_id))
        .await
        .unwrap();
    assert_eq!(
        pointer,
        DisplayPointer::Screen {
            user_id: bob.user_id.clone()
        }
    );
    assert_eq!(classroom.display(ROOM).await, Some(pointer));

    let cleared = classroom
        .controller
        .set_display(ROOM, &alice.user_id, DisplayKind::None, None)
        .await
        .unwrap();
    assert!(cleared.is_none());
    assert_eq!(classroom.messaging.events_named("display_changed").len(), 2);
}

#[tokio::test]
async fn test_set_display_rejects_bad_references() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();

    assert!(matches!(
        classroom
            .controller
            .set_display(ROOM, &alice.user_id, DisplayKind::Screen, None)
            .await,
        Err(RoomError::Validation(_))
    ));
    assert_eq!(
        classroom
            .controller
            .set_display(ROOM, &alice.user_id, DisplayKind::Screen, Some("ghost"))
            .await,
        Err(RoomError::MemberNotFound("ghost".to_string()))
    );
    assert_eq!(
        classroom
            .controller
            .set_display(ROOM, &alice.user_id, DisplayKind::Whiteboard, Some("wb-9"))
            .await,
        Err(RoomError::WhiteboardNotFound("wb-9".to_string()))
    );
    assert!(matches!(
        classroom
            .controller
            .set_display(ROOM, &bob.user_id, DisplayKind::Assistant, None)
            .await,
        Err(RoomError::PermissionDenied(_))
    ));
    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
}

#[tokio::test]
async fn test_set_display_notice_is_required() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();

    classroom.messaging.fail_event("display_changed");
    let result = classroom
        .controller
        .set_display(ROOM, &alice.user_id, DisplayKind::Assistant, None)
        .await;
    assert!(matches!(result, Err(RoomError::Messaging(_))));
}

#[tokio::test]
async fn test_screen_owner_departure_clears_display() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();

    classroom
        .controller
        .set_display(ROOM, &alice.user_id, DisplayKind::Screen, Some(&bob.user_id))
        .await
        .unwrap();
    classroom
        .controller
        .kick(ROOM, &alice.user_id, &bob.user_id)
        .await
        .unwrap();

    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
}

// ============================================================================
// Whiteboards
// ============================================================================

#[tokio::test]
async fn test_create_whiteboard_puts_it_on_display() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();

    let info = classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();
    assert_eq!(info.whiteboard_id, "wb-1");
    assert_eq!(info.name, whiteboard_name(&alice.user_id, "wb-1"));
    assert_eq!(info.current_page, 0);

    assert_eq!(
        classroom.display(ROOM).await,
        Some(DisplayPointer::Whiteboard {
            whiteboard_id: "wb-1".to_string(),
            presenter_id: Some(alice.user_id.clone()),
        })
    );
    assert_eq!(classroom.messaging.events_named("whiteboard_created").len(), 1);

    let listed = classroom.controller.list_whiteboards(ROOM).await.unwrap();
    assert_eq!(listed, vec![info]);
}

#[tokio::test]
async fn test_whiteboard_management_needs_staff() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();

    assert!(matches!(
        classroom.controller.create_whiteboard(ROOM, &bob.user_id).await,
        Err(RoomError::PermissionDenied(_))
    ));

    classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();
    assert!(matches!(
        classroom
            .controller
            .delete_whiteboard(ROOM, &bob.user_id, "wb-1")
            .await,
        Err(RoomError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_whiteboard_create_failure_is_reported() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();

    classroom.whiteboards.set_create_failing(true);
    let result = classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await;
    assert!(matches!(result, Err(RoomError::Whiteboard(_))));
    assert!(classroom.controller.list_whiteboards(ROOM).await.unwrap().is_empty());
    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
}

#[tokio::test]
async fn test_turn_page_updates_whiteboard() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();
    let carol = classroom.join_audience(ROOM, "carol").await.unwrap();

    classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();
    classroom
        .controller
        .turn_page(ROOM, &bob.user_id, "wb-1", 3)
        .await
        .unwrap();

    let listed = classroom.controller.list_whiteboards(ROOM).await.unwrap();
    assert_eq!(listed[0].current_page, 3);
    assert_eq!(classroom.messaging.events_named("page_turned").len(), 1);

    assert!(matches!(
        classroom
            .controller
            .turn_page(ROOM, &carol.user_id, "wb-1", 4)
            .await,
        Err(RoomError::PermissionDenied(_))
    ));
    assert_eq!(
        classroom
            .controller
            .turn_page(ROOM, &bob.user_id, "wb-9", 1)
            .await,
        Err(RoomError::WhiteboardNotFound("wb-9".to_string()))
    );
}

#[tokio::test]
async fn test_delete_whiteboard_clears_display_and_destroys_session() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();

    classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();
    classroom
        .controller
        .delete_whiteboard(ROOM, &alice.user_id, "wb-1")
        .await
        .unwrap();

    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
    assert!(classroom.whiteboards.is_destroyed("wb-1"));
    assert!(classroom.controller.list_whiteboards(ROOM).await.unwrap().is_empty());
    assert_eq!(classroom.messaging.events_named("whiteboard_deleted").len(), 1);

    assert_eq!(
        classroom
            .controller
            .delete_whiteboard(ROOM, &alice.user_id, "wb-1")
            .await,
        Err(RoomError::WhiteboardNotFound("wb-1".to_string()))
    );
}

#[tokio::test]
async fn test_delete_whiteboard_keeps_record_when_destroy_fails() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();

    classroom.whiteboards.set_destroy_failing(true);
    let result = classroom
        .controller
        .delete_whiteboard(ROOM, &alice.user_id, "wb-1")
        .await;
    assert!(matches!(result, Err(RoomError::Whiteboard(_))));
    assert_eq!(classroom.controller.list_whiteboards(ROOM).await.unwrap().len(), 1);
}

// ============================================================================
// Display after departures
// ============================================================================

#[tokio::test]
async fn test_teacher_whiteboard_survives_while_assistant_present() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();

    classroom
        .controller
        .change_role(ROOM, &alice.user_id, &bob.user_id, Role::Teacher)
        .await
        .unwrap();
    classroom
        .controller
        .create_whiteboard(ROOM, &bob.user_id)
        .await
        .unwrap();

    classroom.leave(ROOM, &bob).await.unwrap();

    assert_eq!(
        classroom.display(ROOM).await,
        Some(DisplayPointer::Whiteboard {
            whiteboard_id: "wb-1".to_string(),
            presenter_id: Some(bob.user_id.clone()),
        })
    );
    // Whiteboards belong to the room, not their creator
    assert_eq!(classroom.controller.list_whiteboards(ROOM).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_teacher_whiteboard_cleared_without_assistant() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();
    let _carol = classroom.join(ROOM, "carol").await.unwrap();

    classroom
        .controller
        .change_role(ROOM, &alice.user_id, &bob.user_id, Role::Teacher)
        .await
        .unwrap();
    classroom
        .controller
        .create_whiteboard(ROOM, &bob.user_id)
        .await
        .unwrap();

    classroom.leave(ROOM, &alice).await.unwrap();
    assert!(classroom.display(ROOM).await.unwrap().whiteboard_id().is_some());

    classroom.leave(ROOM, &bob).await.unwrap();
    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
}

#[tokio::test]
async fn test_assistant_whiteboard_cleared_on_departure() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let _bob = classroom.join(ROOM, "bob").await.unwrap();

    classroom
        .controller
        .create_whiteboard(ROOM, &alice.user_id)
        .await
        .unwrap();
    classroom.leave(ROOM, &alice).await.unwrap();

    assert_eq!(classroom.display(ROOM).await, Some(DisplayPointer::None));
}

#[tokio::test]
async fn test_explicit_whiteboard_display_outlives_whoever_chose_it() {
    let classroom = TestClassroom::new();
    let alice = classroom.join(ROOM, "alice").await.unwrap();
    let bob = classroom.join(ROOM, "bob").await.unwrap();
    let _carol = classroom.join(ROOM, "carol").await.unwrap();

    classroom
        .controller
        .change_role(ROOM, &alice.user_id, &bob.user_id, Role::Teacher)
        .await
        .unwrap();
    classroom
        .controller
        .create_whiteboard(ROOM, &bob.user_id)
        .await
        .unwrap();

    let pointer = classroom
        .controller
        .set_display(ROOM, &alice.user_id, DisplayKind::Whiteboard, Some("wb-1"))
        .await
        .unwrap();
    let expected = DisplayPointer::Whiteboard {
        whiteboard_id: "wb-1".to_string(),
        presenter_id: None,
    };
    assert_eq!(pointer, expected);

    classroom.leave(ROOM, &alice).await.unwrap();
    assert_eq!(classroom.display(ROOM).await, Some(expected.clone()));

    classroom.leave(ROOM, &bob).await.unwrap();
    assert_eq!(classroom.display(ROOM).await, Some(expected));
}
