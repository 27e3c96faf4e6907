use crate::config::SchedulerConfig;
use crate::events::JobEvent;
use crate::internal::common::error::{ExecutionError, TrainqError};
use crate::internal::server::job::{JobStatus, Priority, compute_estimated_cost};
use crate::internal::tests::utils::env::TestEnv;
use crate::internal::tests::utils::expect_error_message;
use crate::internal::tests::utils::request::rq;
use crate::internal::tests::utils::services::{NN_RATE, RF_RATE, TestServices};

#[test]
fn test_submit_creates_queued_job() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    let response = env.submit(rq().hours(3)).unwrap();
    assert_eq!(response.estimated_cost, RF_RATE * 3.0);

    let job = env.job(response.job_id);
    assert_eq!(job.status(), JobStatus::Queued);
    assert_eq!(job.estimated_cost, response.estimated_cost);
    assert_eq!(job.progress(), 0);
    assert!(job.started_at.is_none());
    assert!(job.completed_at().is_none());
    assert!(!job.logs().is_empty());

    let entry = env.core().queue().get(response.job_id).unwrap().clone();
    assert_eq!(entry.position, 0);
    env.comm.check_need_scheduling();
    env.comm.emptiness_check();
}

#[test]
fn test_job_ids_are_unique() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    let a = env.submit_ok(rq());
    let b = env.submit_ok(rq());
    let c = env.submit_ok(rq());
    assert!(a < b && b < c);
}

#[test]
fn test_job_id_space_exhaustion() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    env.core().skip_job_ids(u32::MAX as u64 - 1);
    let last = env.submit_ok(rq());
    assert_eq!(last.as_num(), u32::MAX);

    expect_error_message(env.submit(rq()), "exhausted");
    assert_eq!(env.core().jobs().count(), 1);
    assert_eq!(env.core().queue().len(), 1);
    env.core().sanity_check();
}

#[test]
fn test_estimated_cost_uses_algorithm_rate() {
    let mut env = TestEnv::new();
    env.new_gpu_resource(8, 32);
    let response = env
        .submit(rq().algorithm("nn").cpus(2).memory_mb(4096).gpu(true).hours(2))
        .unwrap();
    assert_eq!(response.estimated_cost, compute_estimated_cost(NN_RATE, 2));
    assert_eq!(response.estimated_cost, 20.0);
}

#[test]
fn test_submit_validation_errors() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);

    expect_error_message(env.submit(rq().split(0.05)), "split");
    expect_error_message(env.submit(rq().split(0.95)), "split");
    expect_error_message(env.submit(rq().split(f64::NAN)), "split");
    expect_error_message(env.submit(rq().hours(0)), "runtime");
    expect_error_message(env.submit(rq().cpus(0)), "CPU");
    expect_error_message(env.submit(rq().memory_mb(0)), "Memory");
    expect_error_message(env.submit(rq().dataset("")), "Dataset");

    assert!(matches!(
        env.submit(rq().algorithm("unknown")),
        Err(TrainqError::ValidationError(_))
    ));
    // Below the algorithm minimum (512 MiB)
    assert!(matches!(
        env.submit(rq().memory_mb(128)),
        Err(TrainqError::ValidationError(_))
    ));

    // Boundaries are accepted
    env.submit(rq().split(0.1)).unwrap();
    env.submit(rq().split(0.9)).unwrap();
}

#[test]
fn test_rejected_request_leaves_no_trace() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    assert!(env.submit(rq().split(2.0)).is_err());
    assert!(env.submit(rq().algorithm("svm")).is_err());
    assert_eq!(env.core().jobs().count(), 0);
    assert!(env.core().queue().is_empty());
    env.comm.emptiness_check();

    // Rejections do not consume ids either
    let job_id = env.submit_ok(rq());
    assert_eq!(job_id.as_num(), 1);
}

#[test]
fn test_submit_access_errors() {
    let mut env = TestEnv::with_services(Default::default(), TestServices::deny_dataset("secret"));
    env.new_resource(4, 8);

    let result = env.submit(rq().dataset("secret"));
    assert!(matches!(result, Err(TrainqError::AccessError(_))));
    expect_error_message(env.submit(rq().dataset("secret")), "secret");

    // Disabled algorithm
    assert!(matches!(
        env.submit(rq().algorithm("svm")),
        Err(TrainqError::AccessError(_))
    ));
    env.submit(rq().dataset("public")).unwrap();
}

#[test]
fn test_submit_unsatisfiable() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    expect_error_message(env.submit(rq().cpus(16)), "No registered resource");
    expect_error_message(
        env.submit(rq().algorithm("nn").cpus(2).memory_mb(4096).gpu(true)),
        "No registered resource",
    );

    let mut env = TestEnv::with_config(SchedulerConfig {
        reject_unsatisfiable: false,
        ..Default::default()
    });
    let job_id = env.submit_ok(rq().cpus(16));
    assert!(env.schedule().is_empty());
    assert_eq!(env.status(job_id), JobStatus::Queued);
    assert!(env.core().queue().get(job_id).unwrap().estimated_start.is_none());
}

#[test]
fn test_cancel_queued_job() {
    let mut env = TestEnv::new();
    let r = env.new_resource(4, 8);
    let blocker = env.submit_ok(rq());
    let job_id = env.submit_ok(rq());
    assert_eq!(env.schedule().len(), 1);
    assert_eq!(env.core().queue().get(job_id).unwrap().position, 1);
    env.comm.take_events();
    env.comm.check_need_scheduling();

    env.cancel(job_id).unwrap();
    let job = env.job(job_id);
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert!(job.completed_at().is_some());
    assert!(job.resource_id.is_none());
    assert!(job.actual_cost.is_none());
    assert!(!env.core().queue().contains(job_id));
    assert_eq!(env.resource(r).current_job(), Some(blocker));

    assert!(env.comm.take_costs().is_empty());
    assert_eq!(env.comm.take_events(), vec![JobEvent::Cancelled { job_id }]);
    env.comm.emptiness_check();
}

#[test]
fn test_cancel_terminal_job_fails() {
    let mut env = TestEnv::new();
    let job_id = {
        env.new_resource(4, 8);
        env.submit_ok(rq())
    };
    env.cancel(job_id).unwrap();
    let completed_at = env.job(job_id).completed_at();

    let result = env.cancel(job_id);
    assert!(matches!(
        result,
        Err(TrainqError::NotCancellable {
            status: JobStatus::Cancelled,
            ..
        })
    ));
    expect_error_message(env.cancel(job_id), "not cancellable");
    assert_eq!(env.job(job_id).completed_at(), completed_at);
    assert!(matches!(
        env.cancel(999.into()),
        Err(TrainqError::UnknownJob(_))
    ));
}

#[test]
fn test_cancel_completed_and_failed_jobs() {
    let mut env = TestEnv::new();
    let r1 = env.new_resource(4, 8);
    let r2 = env.new_resource(4, 8);
    let j1 = env.submit_ok(rq());
    let j2 = env.submit_ok(rq());
    env.schedule();
    env.finish(j1, r1);
    env.fail(j2, r2, ExecutionError::terminal("broken"));

    assert!(matches!(
        env.cancel(j1),
        Err(TrainqError::NotCancellable {
            status: JobStatus::Completed,
            ..
        })
    ));
    assert!(matches!(
        env.cancel(j2),
        Err(TrainqError::NotCancellable {
            status: JobStatus::Failed,
            ..
        })
    ));
}

#[test]
fn test_transitions() {
    use JobStatus::*;
    let allowed = [
        (Created, Queued),
        (Created, Cancelled),
        (Queued, Running),
        (Queued, Cancelled),
        (Running, Completed),
        (Running, Failed),
        (Running, Cancelled),
    ];
    let all = [Created, Queued, Running, Completed, Failed, Cancelled];
    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
    for status in [Completed, Failed, Cancelled] {
        assert!(status.is_terminal());
        assert!(!status.is_cancellable());
    }
}

#[test]
fn test_transition_out_of_terminal_state_is_rejected() {
    let mut env = TestEnv::new();
    let r = env.new_resource(4, 8);
    let job_id = env.submit_ok(rq());
    env.schedule();
    env.finish(job_id, r);

    let job = env.job_mut(job_id);
    let completed_at = job.completed_at();
    for to in [
        JobStatus::Running,
        JobStatus::Failed,
        JobStatus::Queued,
        JobStatus::Cancelled,
    ] {
        assert!(matches!(
            job.transition(to),
            Err(TrainqError::InvalidTransition { .. })
        ));
    }
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.completed_at(), completed_at);
}

#[test]
fn test_progress_is_monotonic() {
    let mut env = TestEnv::new();
    env.new_resource(4, 8);
    let job_id = env.submit_ok(rq());

    // Not running yet
    assert!(!env.job_mut(job_id).set_progress(10));
    env.schedule();

    let job = env.job_mut(job_id);
    assert!(job.set_progress(40));
    assert!(!job.set_progress(20));
    assert!(!job.set_progress(40));
    assert!(job.set_progress(200));
    assert_eq!(job.progress(), 100);
}

#[test]
fn test_completion_subscription() {
    let mut env = TestEnv::new();
    let r = env.new_resource(4, 8);
    let job_id = env.submit_ok(rq());
    let mut receiver = env.job_mut(job_id).subscribe_to_completion();
    assert!(receiver.try_recv().is_err());

    env.schedule();
    env.finish(job_id, r);
    assert_eq!(receiver.try_recv().unwrap(), JobStatus::Completed);

    // Late subscribers get the final state right away
    let mut late = env.job_mut(job_id).subscribe_to_completion();
    assert_eq!(late.try_recv().unwrap(), JobStatus::Completed);
}

#[test]
fn test_estimated_start() {
    let mut env = TestEnv::new();
    let r = env.new_resource(4, 8);

    let j1 = env.submit_ok(rq().hours(2));
    let estimate = env.core().queue().get(j1).unwrap().estimated_start.unwrap();
    assert!(estimate <= chrono::Utc::now());
    env.schedule();

    // The only fitting resource is busy until the advisory end of j1
    let j2 = env.submit_ok(rq());
    let started_at = env.job(j1).started_at.unwrap();
    assert_eq!(
        env.core().queue().get(j2).unwrap().estimated_start,
        Some(started_at + chrono::TimeDelta::hours(2))
    );
    assert_eq!(env.resource(r).current_job(), Some(j1));
}

#[test]
fn test_status_view() {
    let mut env = TestEnv::new();
    let r = env.new_resource(4, 8);
    let job_id = env.submit_ok(rq().priority(Priority::High));
    env.schedule();
    env.finish(job_id, r);

    let view = env.job(job_id).status_view();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress_percentage, 100);
    assert_eq!(view.metrics.get("accuracy"), Some(&0.75));
    assert!(view.error.is_none());
    assert!(view.logs.len() >= 3);

    let detail = env.job(job_id).detail();
    assert_eq!(detail.priority, Priority::High);
    assert_eq!(detail.resource_id, Some(r));
    assert_eq!(detail.artifact.unwrap().0, "model");
}
