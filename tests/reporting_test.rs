mod common;

use std::sync::Arc;

use anyhow::Result;
use common::Fixture;
use congedo::application::{AppError, CacheKey, CacheKind, NoCache, Permission};
use congedo::domain::Role;
use congedo::io::Exporter;

#[tokio::test]
async fn test_dashboard_counts_company_activity() -> Result<()> {
    let fx = Fixture::new().await?;
    fx.add("Alan Turing", "alan@acme.test", Role::Employee).await?;
    fx.add("Margaret Hamilton", "margaret@acme.test", Role::Manager).await?;

    let approved = fx.approved(&fx.employee, "2025-03-10", "2025-03-14").await?;
    fx.apply(&fx.employee, "2025-04-01", "2025-04-02").await?;
    let rejected = fx.apply(&fx.employee, "2025-05-01", "2025-05-02").await?;
    fx.service.reject_leave(&fx.admin, rejected).await?;
    fx.service.cancel_leave(&fx.employee, approved).await?;

    let summary = fx.service.dashboard_summary(&fx.admin).await?;
    assert_eq!(summary.total_employees, 2);
    assert_eq!(summary.total_leaves, 3);
    assert_eq!(summary.pending_leaves, 1);
    assert_eq!(summary.approved_leaves, 0);
    assert_eq!(summary.rejected_leaves, 1);
    assert_eq!(summary.cancelled_leaves, 1);

    Ok(())
}

#[tokio::test]
async fn test_transition_evicts_cached_aggregates() -> Result<()> {
    let fx = Fixture::new().await?;
    let dashboard = CacheKey::new(CacheKind::Dashboard, fx.company.id, 2025).to_string();
    let trends = CacheKey::new(CacheKind::MonthlyTrends, fx.company.id, 2025).to_string();

    let before = fx.service.dashboard_summary(&fx.admin).await?;
    fx.service.monthly_trends(&fx.admin, 2025).await?;
    assert!(fx.cache.contains(&dashboard));
    assert!(fx.cache.contains(&trends));
    assert_eq!(before.total_leaves, 0);

    let outcome = fx
        .service
        .apply_leave(
            &fx.employee,
            congedo::application::ApplyLeave::new(common::date("2025-03-10"), common::date("2025-03-14")),
        )
        .await?;
    assert_eq!(outcome.effects.evictions.len(), 2);
    assert!(!fx.cache.contains(&dashboard));
    assert!(!fx.cache.contains(&trends));

    let after = fx.service.dashboard_summary(&fx.admin).await?;
    assert_eq!(after.total_leaves, 1);
    assert_eq!(after.pending_leaves, 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_transition_keeps_cache() -> Result<()> {
    let fx = Fixture::new().await?;
    let id = fx.apply(&fx.employee, "2025-03-10", "2025-03-14").await?;
    fx.service.reject_leave(&fx.admin, id).await?;

    let dashboard = CacheKey::new(CacheKind::Dashboard, fx.company.id, 2025).to_string();
    fx.service.dashboard_summary(&fx.admin).await?;
    assert!(fx.cache.contains(&dashboard));

    assert!(fx.service.reject_leave(&fx.admin, id).await.is_err());
    assert!(fx.cache.contains(&dashboard));

    Ok(())
}

#[tokio::test]
async fn test_uncached_service_always_reads_the_database() -> Result<()> {
    let fx = Fixture::new().await?;
    let uncached = fx.connect().await?.with_cache(Arc::new(NoCache));

    assert_eq!(uncached.dashboard_summary(&fx.admin).await?.total_leaves, 0);
    uncached.monthly_trends(&fx.admin, 2025).await?;
    assert!(fx.cache.is_empty());

    fx.apply(&fx.employee, "2025-03-10", "2025-03-14").await?;
    assert_eq!(uncached.dashboard_summary(&fx.admin).await?.total_leaves, 1);

    Ok(())
}

#[tokio::test]
async fn test_monthly_trends_group_by_start_month() -> Result<()> {
    let fx = Fixture::new().await?;
    fx.approved(&fx.employee, "2025-03-10", "2025-03-11").await?;
    fx.apply(&fx.employee, "2025-03-24", "2025-03-24").await?;
    fx.apply(&fx.employee, "2025-06-02", "2025-06-03").await?;
    fx.apply(&fx.employee, "2026-01-05", "2026-01-06").await?;

    let trends = fx.service.monthly_trends(&fx.admin, 2025).await?;
    assert_eq!(trends.len(), 2);
    assert_eq!(trends[0].month, 3);
    assert_eq!(trends[0].total_leaves, 2);
    assert_eq!(trends[0].approved, 1);
    assert_eq!(trends[0].pending, 1);
    assert_eq!(trends[1].month, 6);

    let next_year = fx.service.monthly_trends(&fx.admin, 2026).await?;
    assert_eq!(next_year.len(), 1);
    assert_eq!(next_year[0].month, 1);

    Ok(())
}

#[tokio::test]
async fn test_reports_require_permission() -> Result<()> {
    let fx = Fixture::new().await?;

    assert!(matches!(
        fx.service.dashboard_summary(&fx.employee).await,
        Err(AppError::Forbidden(Permission::ViewDashboard))
    ));
    assert!(matches!(
        fx.service.monthly_trends(&fx.employee, 2025).await,
        Err(AppError::Forbidden(Permission::ViewReports))
    ));

    let manager = fx.add("Margaret Hamilton", "margaret@acme.test", Role::Manager).await?;
    fx.service.dashboard_summary(&manager).await?;

    Ok(())
}

#[tokio::test]
async fn test_export_leave_register_csv() -> Result<()> {
    let fx = Fixture::new().await?;
    fx.approved(&fx.employee, "2025-03-10", "2025-03-14").await?;
    fx.apply(&fx.employee, "2025-04-01", "2025-04-01").await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&fx.service, &fx.admin)
        .export_leaves_csv(&mut buffer)
        .await?;
    assert_eq!(count, 2);

    let output = String::from_utf8(buffer)?;
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(
        lines[0],
        "employee,department,start_date,end_date,days,leave_type,status,reason"
    );
    assert_eq!(
        lines[1],
        "Ada Lovelace,Engineering,2025-03-10,2025-03-14,5,annual,approved,"
    );
    assert_eq!(
        lines[2],
        "Ada Lovelace,Engineering,2025-04-01,2025-04-01,1,annual,pending,"
    );

    Ok(())
}

#[tokio::test]
async fn test_export_with_no_leaves_writes_header() -> Result<()> {
    let fx = Fixture::new().await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&fx.service, &fx.admin)
        .export_leaves_csv(&mut buffer)
        .await?;

    assert_eq!(count, 0);
    assert_eq!(
        String::from_utf8(buffer)?.trim_end(),
        "employee,department,start_date,end_date,days,leave_type,status,reason"
    );

    Ok(())
}
