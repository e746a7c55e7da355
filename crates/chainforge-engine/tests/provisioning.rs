//! End-to-end provisioning scenarios driven by fake terraform and ansible
//! binaries (shell scripts standing in for the real tools).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chainforge_domain::binance::{self, Network, NodeType};
use chainforge_domain::{
    AccountId, DeploymentState, Job, JobBuilder, ProviderSettings, ProviderType, ServerBuilder,
    ServerState, SshKey, JOB_STATE_COMPLETED, JOB_STATE_FAILED, JOB_STATE_SERVER_CREATED,
};
use chainforge_driver::{Ansible, AnsibleConfig, Terraform, TerraformConfig};
use chainforge_engine::{
    configure_job_state_machine, DeploymentProvisioner, EngineError, JobScheduler, JobStateMachine,
    Provisioner, ServerDestroyer, ServerProvisioner, StepContext, WorkerPool, WorkerPoolConfig,
};
use chainforge_machine::StatefulResource;
use chainforge_store::{MemoryStore, ProvisionStore, StoreError};
use chainforge_vault::Vault;
use semver::Version;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$1" >> "$dir/terraform.log"
case "$1" in
  plan) echo "plan-artifact" > tfplan ;;
  apply) echo "{\"serial\": 1}" > terraform.tfstate ;;
  output) echo "203.0.113.10" ;;
  destroy) echo "{\"serial\": 2}" > terraform.tfstate ;;
  version) echo "Terraform v1.5.7" ;;
esac
exit 0
"#;

const TERRAFORM_BAD_OUTPUT: &str = r#"#!/bin/sh
case "$1" in
  plan) echo "plan-artifact" > tfplan ;;
  apply) echo "{\"serial\": 1}" > terraform.tfstate ;;
  output) echo "not-an-ip" ;;
esac
exit 0
"#;

const ANSIBLE_OK: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "ansible-playbook 2.9.6"; exit 0 ;;
esac
exit 0
"#;

const ANSIBLE_UNREACHABLE: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "ansible-playbook 2.9.6"; exit 0 ;;
esac
exit 4
"#;

/// Unreachable twice, then fine.
const ANSIBLE_FLAKY: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "ansible-playbook 2.9.6"; exit 0 ;;
esac
dir="$(dirname "$0")"
count=$(cat "$dir/attempts" 2>/dev/null || echo 0)
count=$((count + 1))
echo "$count" > "$dir/attempts"
if [ "$count" -le 2 ]; then
  exit 4
fi
exit 0
"#;

fn test_key() -> SshKey {
    static KEY: OnceLock<SshKey> = OnceLock::new();
    KEY.get_or_init(|| SshKey::generate_with_bits("test-key", 1024).unwrap())
        .clone()
}

struct Harness {
    tools: TempDir,
    store: Arc<dyn ProvisionStore>,
    scheduler: JobScheduler,
    server_provisioner: Arc<ServerProvisioner>,
    deployment_provisioner: Arc<DeploymentProvisioner>,
    provisioner: Arc<Provisioner>,
    destroyer: ServerDestroyer,
}

impl Harness {
    fn new(terraform_script: &str, ansible_script: &str, retry_delay: Duration) -> Self {
        let tools = TempDir::new().unwrap();
        let terraform_path = write_script(&tools, "terraform", terraform_script);
        let ansible_path = write_script(&tools, "ansible-playbook", ansible_script);

        let playbooks_dir = tools.path().join("playbooks");
        fs::create_dir_all(&playbooks_dir).unwrap();

        let store: Arc<dyn ProvisionStore> =
            Arc::new(MemoryStore::new(Vault::new("engine-test-secret")));

        let terraform = Terraform::new(&TerraformConfig { path: terraform_path });
        let ansible = Ansible::new(&AnsibleConfig {
            path: ansible_path,
            playbooks_dir,
            keys_dir: tools.path().join("keys"),
        });

        let server_provisioner = Arc::new(ServerProvisioner::new(terraform.clone()));
        let deployment_provisioner =
            Arc::new(DeploymentProvisioner::new(ansible).with_retry_delay(retry_delay));

        let machine = configure_job_state_machine(
            server_provisioner.clone(),
            deployment_provisioner.clone(),
            store.clone(),
        );

        let provisioner = Arc::new(Provisioner::new(
            machine,
            JobScheduler::new(store.clone()),
            ServerDestroyer::new(terraform.clone(), store.clone()),
            store.clone(),
        ));

        Harness {
            tools,
            scheduler: JobScheduler::new(store.clone()),
            server_provisioner,
            deployment_provisioner,
            provisioner,
            destroyer: ServerDestroyer::new(terraform, store.clone()),
            store,
        }
    }

    fn machine(&self) -> JobStateMachine {
        configure_job_state_machine(
            self.server_provisioner.clone(),
            self.deployment_provisioner.clone(),
            self.store.clone(),
        )
    }

    async fn schedule(&self) -> Job {
        let account_id = AccountId::generate();
        let settings = ProviderSettings::new(
            account_id.clone(),
            "personal",
            ProviderType::DigitalOcean,
            "do-token",
        );
        self.store.create_provider_settings(&settings).await.unwrap();

        let server = ServerBuilder::new(account_id.clone())
            .provider(ProviderType::DigitalOcean)
            .ssh_key(test_key())
            .build()
            .unwrap();
        let deployment =
            binance::node_deployment(Network::Testnet, NodeType::LightNode, Version::new(0, 6, 1));

        let job = JobBuilder::new(account_id)
            .provider(settings)
            .server(server)
            .deployment(deployment)
            .build()
            .unwrap();

        self.scheduler.schedule(&job).await.unwrap();
        job
    }

    fn terraform_log(&self) -> Vec<String> {
        match fs::read_to_string(self.tools.path().join("terraform.log")) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn clear_terraform_log(&self) {
        let _ = fs::remove_file(self.tools.path().join("terraform.log"));
    }
}

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn quick() -> Duration {
    Duration::from_millis(10)
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_reaches_completed_with_a_provisioned_server() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();

    let stored_job = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored_job.state(), JOB_STATE_COMPLETED);
    let finished_at = stored_job.finished_at.expect("finished_at must be set");
    assert!(finished_at >= stored_job.created_at);

    let server = harness.store.get_server(&job.server_id).await.unwrap();
    assert_eq!(server.state, ServerState::Ok);
    assert_eq!(server.ip_address, Some("203.0.113.10".parse().unwrap()));

    let snapshot = server.workspace_snapshot.expect("snapshot must be present");
    assert!(!snapshot.definitions.is_empty());
    assert!(!snapshot.plan.is_empty());
    assert!(!snapshot.state.is_empty());

    let deployment = harness.store.get_deployment(&job.deployment_id).await.unwrap();
    assert_eq!(deployment.state, DeploymentState::Ok);

    let log = harness.terraform_log();
    assert_eq!(log, vec!["init", "plan", "apply", "output"]);
}

#[tokio::test]
async fn deployment_retries_until_the_host_answers() {
    let delay = Duration::from_millis(30);
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_FLAKY, delay);
    let job = harness.schedule().await;

    let started = Instant::now();
    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Two unreachable attempts and the successful third, each preceded by
    // the retry delay.
    assert!(elapsed >= delay * 3, "expected three waits, took {elapsed:?}");

    let attempts = fs::read_to_string(harness.tools.path().join("attempts")).unwrap();
    assert_eq!(attempts.trim(), "3");

    let stored_job = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored_job.state(), JOB_STATE_COMPLETED);

    let deployment = harness.store.get_deployment(&job.deployment_id).await.unwrap();
    assert_eq!(deployment.state, DeploymentState::Ok);
}

#[tokio::test]
async fn exhausted_retries_fail_the_job_but_keep_the_server() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_UNREACHABLE, quick());
    let job = harness.schedule().await;

    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();

    let stored_job = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored_job.state(), JOB_STATE_FAILED);
    assert!(stored_job.finished_at.is_some());

    // The deployment never left Requested; the server survives with its
    // snapshot so the operator can destroy it.
    let deployment = harness.store.get_deployment(&job.deployment_id).await.unwrap();
    assert_eq!(deployment.state, DeploymentState::Requested);

    let server = harness.store.get_server(&job.server_id).await.unwrap();
    assert_eq!(server.state, ServerState::Ok);
    assert!(server.workspace_snapshot.is_some());
}

#[tokio::test]
async fn invalid_ip_output_fails_the_job() {
    let harness = Harness::new(TERRAFORM_BAD_OUTPUT, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();

    let stored_job = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored_job.state(), JOB_STATE_FAILED);
    assert!(stored_job.finished_at.is_some());

    // The failed step's transaction was rolled back: the server row never
    // saw the Ok transition.
    let server = harness.store.get_server(&job.server_id).await.unwrap();
    assert_eq!(server.state, ServerState::Requested);
    assert!(server.workspace_snapshot.is_none());
}

#[tokio::test]
async fn destroy_removes_server_and_deployments_atomically() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();

    let mut server = harness.store.get_server(&job.server_id).await.unwrap();
    harness.destroyer.destroy(&mut server).await.unwrap();

    assert_eq!(server.state, ServerState::Deleted);
    // Destroy refreshed the snapshot from the mutated state file.
    let snapshot = server.workspace_snapshot.as_ref().unwrap();
    assert!(snapshot.state.contains("\"serial\": 2"));

    assert!(matches!(
        harness.store.get_server(&job.server_id).await,
        Err(StoreError::ServerNotFound(_))
    ));
    assert!(matches!(
        harness.store.get_deployment(&job.deployment_id).await,
        Err(StoreError::DeploymentNotFound(_))
    ));

    // Destroying again misses the server row.
    let mut again = server.clone();
    let err = harness.destroyer.destroy(&mut again).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::ServerNotFound(_))
    ));
}

#[tokio::test]
async fn destroy_without_snapshot_has_no_side_effects() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    let mut server = harness.store.get_server(&job.server_id).await.unwrap();
    assert!(server.workspace_snapshot.is_none());

    let err = harness.destroyer.destroy(&mut server).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingWorkspaceSnapshot));

    // Nothing ran and nothing was deleted.
    assert!(harness.terraform_log().is_empty());
    assert!(harness.store.get_server(&job.server_id).await.is_ok());
    assert!(harness.store.get_deployment(&job.deployment_id).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn twenty_concurrent_jobs_all_finish_exactly_once() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());

    let mut jobs = Vec::new();
    for _ in 0..20 {
        jobs.push(harness.schedule().await);
    }

    let pool = WorkerPool::new(
        &WorkerPoolConfig {
            worker_count: 20,
            poll_interval: Duration::from_millis(50),
        },
        harness.store.clone(),
        harness.provisioner.clone(),
    );

    let cancel = CancellationToken::new();
    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move { pool.run(pool_cancel).await });

    // Wait for every job to reach a terminal state.
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let open = harness.store.find_incomplete_jobs(&[]).await.unwrap();
        if open.is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "jobs did not finish in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    pool_handle.await.unwrap();

    for job in &jobs {
        let stored = harness.store.get_job(&job.id).await.unwrap();
        assert_eq!(stored.state(), JOB_STATE_COMPLETED, "job {} not completed", job.id);
    }

    // Each job applied exactly once: no double dispatch happened.
    let applies = harness
        .terraform_log()
        .into_iter()
        .filter(|line| line == "apply")
        .count();
    assert_eq!(applies, 20);
}

#[tokio::test]
async fn restart_recovery_resumes_from_the_persisted_state() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    // First step only, as if the process died right after it committed.
    let machine = harness.machine();
    let mut hydrated = harness.scheduler.find_scheduled(&job.id).await.unwrap();
    let mut ctx = StepContext::new(harness.store.clone());
    machine.step(&mut ctx, &mut hydrated).await.unwrap();

    let stored = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored.state(), JOB_STATE_SERVER_CREATED);
    assert!(stored.finished_at.is_none());

    // The producer would re-discover the job after a restart.
    let open = harness.store.find_incomplete_jobs(&[]).await.unwrap();
    assert!(open.iter().any(|j| j.id == job.id));

    // Resume: only the deployment step runs, no second apply.
    harness.clear_terraform_log();
    harness
        .provisioner
        .provision(&CancellationToken::new(), &job.id)
        .await
        .unwrap();

    let stored = harness.store.get_job(&job.id).await.unwrap();
    assert_eq!(stored.state(), JOB_STATE_COMPLETED);
    assert!(harness.terraform_log().is_empty(), "server step must not re-run");
}

#[tokio::test]
async fn cancelling_the_pool_stops_the_producer_within_a_poll() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());

    let pool = WorkerPool::new(
        &WorkerPoolConfig {
            worker_count: 2,
            poll_interval: Duration::from_secs(10),
        },
        harness.store.clone(),
        harness.provisioner.clone(),
    );

    let cancel = CancellationToken::new();
    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move { pool.run(pool_cancel).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    // The polling sleep aborts immediately; nowhere near the 10s interval.
    tokio::time::timeout(Duration::from_secs(3), pool_handle)
        .await
        .expect("pool did not stop after cancellation")
        .unwrap();
}

#[tokio::test]
async fn provisioners_reject_resources_in_the_wrong_state() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;
    let hydrated = harness.scheduler.find_scheduled(&job.id).await.unwrap();

    let settings = hydrated.provider_settings.clone().unwrap();
    let mut server = hydrated.server.clone().unwrap();
    let mut deployment = hydrated.deployment.clone().unwrap();

    // A server that is already Ok cannot be provisioned again.
    server.state = ServerState::Ok;
    let mut ctx = StepContext::new(harness.store.clone());
    let err = harness
        .server_provisioner
        .provision(&mut ctx, &settings, &mut server)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ServerNotReadyForProvisioning));

    // Deployments only land on Ok servers.
    server.state = ServerState::Requested;
    let mut ctx = StepContext::new(harness.store.clone());
    let err = harness
        .deployment_provisioner
        .provision(&mut ctx, &server, &mut deployment)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ServerNotReadyForDeployments));

    // And only while still Requested themselves.
    server.state = ServerState::Ok;
    deployment.state = DeploymentState::Ok;
    let mut ctx = StepContext::new(harness.store.clone());
    let err = harness
        .deployment_provisioner
        .provision(&mut ctx, &server, &mut deployment)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeploymentNotInRequestedState));

    // No tool ran for any of the rejections.
    assert!(harness.terraform_log().is_empty());
}

#[tokio::test]
async fn find_scheduled_misses_surface_as_not_found() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());

    let err = harness
        .scheduler
        .find_scheduled(&chainforge_domain::JobId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::JobNotFound(_))));
}

#[tokio::test]
async fn schedule_is_atomic_against_collisions() {
    let harness = Harness::new(FAKE_TERRAFORM, ANSIBLE_OK, quick());
    let job = harness.schedule().await;

    // Re-scheduling the same job collides on every row and must leave the
    // first registration untouched.
    let err = harness.scheduler.schedule(&job).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::ServerAlreadyExists(_))));

    assert!(harness.store.get_job(&job.id).await.is_ok());
}

/// Restart recovery against the durable store: the first step's results are
/// written to disk, the whole engine is torn down, and a rebuilt engine
/// finishes the job from the persisted state.
#[tokio::test]
async fn restart_recovery_survives_a_real_store_reopen() {
    let tools = TempDir::new().unwrap();
    let terraform_path = write_script(&tools, "terraform", FAKE_TERRAFORM);
    let ansible_path = write_script(&tools, "ansible-playbook", ANSIBLE_OK);
    let playbooks_dir = tools.path().join("playbooks");
    fs::create_dir_all(&playbooks_dir).unwrap();

    let db_path = tools.path().join("state.redb");
    let vault_secret = "redb-restart-secret";

    let build_engine = |store: Arc<dyn ProvisionStore>| {
        let terraform = Terraform::new(&TerraformConfig { path: terraform_path.clone() });
        let ansible = Ansible::new(&AnsibleConfig {
            path: ansible_path.clone(),
            playbooks_dir: playbooks_dir.clone(),
            keys_dir: tools.path().join("keys"),
        });

        let server_provisioner = Arc::new(ServerProvisioner::new(terraform.clone()));
        let deployment_provisioner =
            Arc::new(DeploymentProvisioner::new(ansible).with_retry_delay(quick()));
        let machine = configure_job_state_machine(
            server_provisioner,
            deployment_provisioner,
            store.clone(),
        );

        Provisioner::new(
            machine,
            JobScheduler::new(store.clone()),
            ServerDestroyer::new(terraform, store.clone()),
            store,
        )
    };

    let job_id;
    {
        // First process: schedule and run only the server step.
        let store: Arc<dyn ProvisionStore> = Arc::new(
            chainforge_store::RedbStore::open(&db_path, Vault::new(vault_secret)).unwrap(),
        );

        let account_id = AccountId::generate();
        let settings = ProviderSettings::new(
            account_id.clone(),
            "personal",
            ProviderType::DigitalOcean,
            "do-token",
        );
        store.create_provider_settings(&settings).await.unwrap();

        let server = ServerBuilder::new(account_id.clone())
            .provider(ProviderType::DigitalOcean)
            .ssh_key(test_key())
            .build()
            .unwrap();
        let deployment =
            binance::node_deployment(Network::Testnet, NodeType::LightNode, Version::new(0, 6, 1));
        let job = JobBuilder::new(account_id)
            .provider(settings)
            .server(server)
            .deployment(deployment)
            .build()
            .unwrap();

        let scheduler = JobScheduler::new(store.clone());
        scheduler.schedule(&job).await.unwrap();
        job_id = job.id.clone();

        let server_provisioner = Arc::new(ServerProvisioner::new(Terraform::new(
            &TerraformConfig { path: terraform_path.clone() },
        )));
        let deployment_provisioner = Arc::new(
            DeploymentProvisioner::new(Ansible::new(&AnsibleConfig {
                path: ansible_path.clone(),
                playbooks_dir: playbooks_dir.clone(),
                keys_dir: tools.path().join("keys"),
            }))
            .with_retry_delay(quick()),
        );
        let machine = configure_job_state_machine(
            server_provisioner,
            deployment_provisioner,
            store.clone(),
        );

        let mut hydrated = scheduler.find_scheduled(&job_id).await.unwrap();
        let mut ctx = StepContext::new(store.clone());
        machine.step(&mut ctx, &mut hydrated).await.unwrap();
        // Store dropped here; the "process" dies.
    }

    {
        // Second process: reopen the database and finish the job.
        let store: Arc<dyn ProvisionStore> = Arc::new(
            chainforge_store::RedbStore::open(&db_path, Vault::new(vault_secret)).unwrap(),
        );

        let open = store.find_incomplete_jobs(&[]).await.unwrap();
        assert!(open.iter().any(|j| j.id == job_id), "job must be re-discoverable");

        let provisioner = build_engine(store.clone());
        provisioner
            .provision(&CancellationToken::new(), &job_id)
            .await
            .unwrap();

        let stored = store.get_job(&job_id).await.unwrap();
        assert_eq!(stored.state(), JOB_STATE_COMPLETED);

        let server = store.get_server(&stored.server_id).await.unwrap();
        assert_eq!(server.state, ServerState::Ok);
        assert!(server.workspace_snapshot.is_some());
    }
}
