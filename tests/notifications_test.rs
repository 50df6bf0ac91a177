mod common;

use anyhow::Result;
use common::Fixture;
use congedo::application::{AppError, PushKind};
use congedo::domain::{LeaveStatus, Role};

#[tokio::test]
async fn test_apply_notifies_every_admin() -> Result<()> {
    let fx = Fixture::new().await?;
    let second_admin = fx.add("Linus Admin", "linus@acme.test", Role::Admin).await?;
    let manager = fx.add("Margaret Hamilton", "margaret@acme.test", Role::Manager).await?;

    fx.apply(&fx.employee, "2025-03-10", "2025-03-14").await?;

    for admin in [&fx.admin, &second_admin] {
        let inbox = fx.service.list_notifications(admin).await?;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "New Leave Application");
        assert_eq!(inbox[0].message, "Ada Lovelace applied for leave.");

        let pushes = fx.push.sent_to(admin.user_id);
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].kind, PushKind::Info);
    }
    assert!(fx.service.list_notifications(&manager).await?.is_empty());
    assert!(fx.push.sent_to(fx.employee.user_id).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_push_failure_does_not_undo_transition() -> Result<()> {
    let fx = Fixture::new().await?;
    let id = fx.apply(&fx.employee, "2025-03-10", "2025-03-14").await?;

    fx.push.fail(true);
    let outcome = fx.service.approve_leave(&fx.admin, id).await?;

    assert_eq!(outcome.leave.status, LeaveStatus::Approved);
    assert_eq!(outcome.effects.pushes.len(), 1);
    assert_eq!(fx.used_leave(&fx.employee).await?, 5);
    assert!(fx.push.sent_to(fx.employee.user_id).is_empty());

    // The inbox is the recovery path
    let inbox = fx.service.list_notifications(&fx.employee).await?;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].title, "Leave Approved");

    Ok(())
}

#[tokio::test]
async fn test_failed_transition_emits_nothing() -> Result<()> {
    let fx = Fixture::new().await?;
    let id = fx.apply(&fx.employee, "2025-03-10", "2025-03-14").await?;
    fx.service.reject_leave(&fx.admin, id).await?;
    let pushed = fx.push.sent().len();

    assert!(fx.service.approve_leave(&fx.admin, id).await.is_err());

    assert_eq!(fx.push.sent().len(), pushed);
    assert_eq!(fx.service.list_notifications(&fx.employee).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_decision_pushes_carry_kind() -> Result<()> {
    let fx = Fixture::new().await?;
    let approved = fx.approved(&fx.employee, "2025-03-10", "2025-03-14").await?;
    let rejected = fx.apply(&fx.employee, "2025-04-01", "2025-04-02").await?;
    fx.service.reject_leave(&fx.admin, rejected).await?;
    fx.service.cancel_leave(&fx.employee, approved).await?;

    let kinds: Vec<_> = fx
        .push
        .sent_to(fx.employee.user_id)
        .into_iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(kinds, vec![PushKind::Success, PushKind::Error, PushKind::Warning]);

    Ok(())
}

#[tokio::test]
async fn test_mark_read_is_scoped_to_recipient() -> Result<()> {
    let fx = Fixture::new().await?;
    fx.approved(&fx.employee, "2025-03-10", "2025-03-14").await?;

    let admin_inbox = fx.service.list_notifications(&fx.admin).await?;
    let foreign = admin_inbox[0].id;
    let err = fx
        .service
        .mark_notification_read(&fx.employee, foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotificationNotFound(id) if id == foreign));
    assert!(!fx.service.list_notifications(&fx.admin).await?[0].is_read);

    let own = fx.service.list_notifications(&fx.employee).await?[0].id;
    fx.service.mark_notification_read(&fx.employee, own).await?;
    assert!(fx.service.list_notifications(&fx.employee).await?[0].is_read);

    Ok(())
}
