use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chainforge_domain::{
    Account, AccountId, Deployment, DeploymentId, Job, JobId, ProviderSettings,
    ProviderSettingsId, Server, ServerId,
};
use chainforge_vault::Vault;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use crate::error::StoreError;
use crate::record::{
    marshal_account, marshal_deployment, marshal_job, marshal_provider_settings, marshal_server,
    unmarshal_account, unmarshal_deployment, unmarshal_job, unmarshal_provider_settings,
    unmarshal_server, AccountRecord, DeploymentRecord, JobRecord, ProviderSettingsRecord,
    ServerRecord,
};
use crate::store::ProvisionStore;
use crate::tx::{StoreTx, WriteOp};
use crate::CREDENTIALS_TOMBSTONE;

const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
const PROVIDER_SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("provider_settings");
const SERVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");
const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

fn internal(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

// ── RedbStore ─────────────────────────────────────────────────────────────────

/// Persistent [`ProvisionStore`] backed by a redb database file.
///
/// Each [`StoreTx`] batch maps onto a single redb write transaction, so a
/// failed batch is dropped uncommitted and rows survive process restarts.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    vault: Vault,
}

impl RedbStore {
    /// Open (or create) a database at `path`. Parent directories are created
    /// automatically.
    pub fn open(path: &Path, vault: Vault) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;

        // Ensure tables exist
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(ACCOUNTS).map_err(internal)?;
            wtxn.open_table(PROVIDER_SETTINGS).map_err(internal)?;
            wtxn.open_table(SERVERS).map_err(internal)?;
            wtxn.open_table(DEPLOYMENTS).map_err(internal)?;
            wtxn.open_table(JOBS).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }

        Ok(RedbStore { db: Arc::new(db), vault })
    }

    fn apply(&self, wtxn: &WriteTransaction, op: &WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::CreateAccount(account) => {
                let mut table = wtxn.open_table(ACCOUNTS).map_err(internal)?;
                if table.get(account.id.as_str()).map_err(internal)?.is_some() {
                    return Err(StoreError::AccountAlreadyExists(account.id.clone()));
                }
                let duplicate_email = table_rows::<AccountRecord>(&table)?
                    .into_iter()
                    .any(|r| r.email == account.email);
                if duplicate_email {
                    return Err(StoreError::EmailAlreadyExists(account.email.clone()));
                }
                insert(&mut table, account.id.as_str(), &marshal_account(account))?;
            }
            WriteOp::UpdateAccount(account) => {
                let mut table = wtxn.open_table(ACCOUNTS).map_err(internal)?;
                if table.get(account.id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::AccountNotFound(account.id.clone()));
                }
                insert(&mut table, account.id.as_str(), &marshal_account(account))?;
            }

            WriteOp::CreateProviderSettings(settings) => {
                let mut table = wtxn.open_table(PROVIDER_SETTINGS).map_err(internal)?;
                if table.get(settings.id.as_str()).map_err(internal)?.is_some() {
                    return Err(StoreError::ProviderSettingsAlreadyExists(settings.id.clone()));
                }
                let record = marshal_provider_settings(settings, &self.vault)?;
                insert(&mut table, settings.id.as_str(), &record)?;
            }
            WriteOp::UpdateProviderSettings(settings) => {
                let mut table = wtxn.open_table(PROVIDER_SETTINGS).map_err(internal)?;
                if table.get(settings.id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::ProviderSettingsNotFound(settings.id.clone()));
                }
                let record = marshal_provider_settings(settings, &self.vault)?;
                insert(&mut table, settings.id.as_str(), &record)?;
            }
            WriteOp::DeleteProviderSettings(id) => {
                let mut table = wtxn.open_table(PROVIDER_SETTINGS).map_err(internal)?;
                let mut record: ProviderSettingsRecord = match table.get(id.as_str()).map_err(internal)? {
                    Some(guard) => serde_json::from_slice(guard.value())?,
                    None => return Err(StoreError::ProviderSettingsNotFound(id.clone())),
                };

                // Overwrite the credentials column before the row goes away.
                record.credentials = CREDENTIALS_TOMBSTONE.to_string();
                insert(&mut table, id.as_str(), &record)?;
                table.remove(id.as_str()).map_err(internal)?;
            }

            WriteOp::CreateServer(server) => {
                let mut table = wtxn.open_table(SERVERS).map_err(internal)?;
                if table.get(server.id.as_str()).map_err(internal)?.is_some() {
                    return Err(StoreError::ServerAlreadyExists(server.id.clone()));
                }
                let record = marshal_server(server, &self.vault)?;
                insert(&mut table, server.id.as_str(), &record)?;
            }
            WriteOp::UpdateServer(server) => {
                let mut table = wtxn.open_table(SERVERS).map_err(internal)?;
                if table.get(server.id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::ServerNotFound(server.id.clone()));
                }
                let record = marshal_server(server, &self.vault)?;
                insert(&mut table, server.id.as_str(), &record)?;
            }
            WriteOp::DeleteServer(id) => {
                let mut table = wtxn.open_table(SERVERS).map_err(internal)?;
                if table.remove(id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::ServerNotFound(id.clone()));
                }
            }

            WriteOp::CreateDeployment(deployment) => {
                let mut table = wtxn.open_table(DEPLOYMENTS).map_err(internal)?;
                if table.get(deployment.id.as_str()).map_err(internal)?.is_some() {
                    return Err(StoreError::DeploymentAlreadyExists(deployment.id.clone()));
                }
                insert(&mut table, deployment.id.as_str(), &marshal_deployment(deployment)?)?;
            }
            WriteOp::UpdateDeployment(deployment) => {
                let mut table = wtxn.open_table(DEPLOYMENTS).map_err(internal)?;
                if table.get(deployment.id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::DeploymentNotFound(deployment.id.clone()));
                }
                insert(&mut table, deployment.id.as_str(), &marshal_deployment(deployment)?)?;
            }
            WriteOp::DeleteDeploymentsForServer(server_id) => {
                let mut table = wtxn.open_table(DEPLOYMENTS).map_err(internal)?;
                let mut stale = Vec::new();
                for entry in table.iter().map_err(internal)? {
                    let (key, value) = entry.map_err(internal)?;
                    let record: DeploymentRecord = serde_json::from_slice(value.value())?;
                    if record.server_id == server_id.as_str() {
                        stale.push(key.value().to_string());
                    }
                }
                for key in stale {
                    table.remove(key.as_str()).map_err(internal)?;
                }
            }

            WriteOp::CreateJob(job) => {
                let mut table = wtxn.open_table(JOBS).map_err(internal)?;
                if table.get(job.id.as_str()).map_err(internal)?.is_some() {
                    return Err(StoreError::JobAlreadyExists(job.id.clone()));
                }
                insert(&mut table, job.id.as_str(), &marshal_job(job))?;
            }
            WriteOp::UpdateJob(job) => {
                let mut table = wtxn.open_table(JOBS).map_err(internal)?;
                if table.get(job.id.as_str()).map_err(internal)?.is_none() {
                    return Err(StoreError::JobNotFound(job.id.clone()));
                }
                insert(&mut table, job.id.as_str(), &marshal_job(job))?;
            }
        }

        Ok(())
    }

    fn read_one<R: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<R>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(table).map_err(internal)?;
        match table.get(key).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_all<R: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<R>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(table).map_err(internal)?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_key, value) = entry.map_err(internal)?;
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }
}

fn insert<R: serde::Serialize>(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    record: &R,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(record)?;
    table.insert(key, bytes.as_slice()).map_err(internal)?;
    Ok(())
}

fn table_rows<R: serde::de::DeserializeOwned>(
    table: &redb::Table<'_, &'static str, &'static [u8]>,
) -> Result<Vec<R>, StoreError> {
    let mut rows = Vec::new();
    for entry in table.iter().map_err(internal)? {
        let (_key, value) = entry.map_err(internal)?;
        rows.push(serde_json::from_slice(value.value())?);
    }
    Ok(rows)
}

#[async_trait]
impl ProvisionStore for RedbStore {
    async fn commit(&self, tx: StoreTx) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        for op in &tx.ops {
            // Dropping the uncommitted transaction on error aborts the batch.
            self.apply(&wtxn, op)?;
        }
        wtxn.commit().map_err(internal)
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        let record: AccountRecord = self
            .read_one(ACCOUNTS, id.as_str())?
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;

        Ok(unmarshal_account(&record))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let record = self
            .read_all::<AccountRecord>(ACCOUNTS)?
            .into_iter()
            .find(|r| r.email == email)
            .ok_or_else(|| StoreError::AccountNotFound(AccountId::new(email)))?;

        Ok(unmarshal_account(&record))
    }

    async fn get_provider_settings(
        &self,
        id: &ProviderSettingsId,
    ) -> Result<ProviderSettings, StoreError> {
        let record: ProviderSettingsRecord = self
            .read_one(PROVIDER_SETTINGS, id.as_str())?
            .ok_or_else(|| StoreError::ProviderSettingsNotFound(id.clone()))?;

        unmarshal_provider_settings(&record, &self.vault)
    }

    async fn list_provider_settings(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<ProviderSettings>, StoreError> {
        self.read_all::<ProviderSettingsRecord>(PROVIDER_SETTINGS)?
            .iter()
            .filter(|r| r.account_id == owner.as_str())
            .map(|r| unmarshal_provider_settings(r, &self.vault))
            .collect()
    }

    async fn get_server(&self, id: &ServerId) -> Result<Server, StoreError> {
        let record: ServerRecord = self
            .read_one(SERVERS, id.as_str())?
            .ok_or_else(|| StoreError::ServerNotFound(id.clone()))?;

        unmarshal_server(&record, &self.vault)
    }

    async fn list_servers(&self, owner: &AccountId) -> Result<Vec<Server>, StoreError> {
        self.read_all::<ServerRecord>(SERVERS)?
            .iter()
            .filter(|r| r.account_id == owner.as_str())
            .map(|r| unmarshal_server(r, &self.vault))
            .collect()
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, StoreError> {
        let record: DeploymentRecord = self
            .read_one(DEPLOYMENTS, id.as_str())?
            .ok_or_else(|| StoreError::DeploymentNotFound(id.clone()))?;

        unmarshal_deployment(&record)
    }

    async fn find_deployments_by_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<Deployment>, StoreError> {
        self.read_all::<DeploymentRecord>(DEPLOYMENTS)?
            .iter()
            .filter(|r| r.server_id == server_id.as_str())
            .map(unmarshal_deployment)
            .collect()
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        let record: JobRecord = self
            .read_one(JOBS, id.as_str())?
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;

        unmarshal_job(&record)
    }

    async fn list_jobs(&self, owner: &AccountId) -> Result<Vec<Job>, StoreError> {
        self.read_all::<JobRecord>(JOBS)?
            .iter()
            .filter(|r| r.account_id == owner.as_str())
            .map(unmarshal_job)
            .collect()
    }

    async fn find_incomplete_jobs(&self, excluding: &[JobId]) -> Result<Vec<Job>, StoreError> {
        self.read_all::<JobRecord>(JOBS)?
            .iter()
            .filter(|r| r.finished_at.is_none())
            .filter(|r| !excluding.iter().any(|id| id.as_str() == r.id))
            .map(unmarshal_job)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainforge_domain::binance::{self, Network, NodeType};
    use chainforge_domain::{JobBuilder, ProviderType, ServerBuilder, SshKey};
    use semver::Version;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state.redb"), Vault::new("redb-test-secret")).unwrap()
    }

    fn test_job(account_id: &AccountId) -> Job {
        let settings = ProviderSettings::new(
            account_id.clone(),
            "personal",
            ProviderType::DigitalOcean,
            "do-token",
        );
        let server = ServerBuilder::new(account_id.clone())
            .provider(ProviderType::DigitalOcean)
            .ssh_key(SshKey::generate_with_bits("test-key", 1024).unwrap())
            .build()
            .unwrap();
        let deployment =
            binance::node_deployment(Network::Testnet, NodeType::LightNode, Version::new(0, 6, 1));

        JobBuilder::new(account_id.clone())
            .provider(settings)
            .server(server)
            .deployment(deployment)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn batch_commit_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = test_job(&AccountId::generate());

        let mut tx = StoreTx::new();
        tx.create_server(job.server.as_ref().unwrap());
        tx.create_deployment(job.deployment.as_ref().unwrap());
        tx.create_job(&job);
        store.commit(tx).await.unwrap();

        let loaded = store.get_job(&job.id).await.unwrap();
        assert_eq!(loaded.server_id, job.server_id);

        let server = store.get_server(&job.server_id).await.unwrap();
        assert_eq!(server.name, job.server.as_ref().unwrap().name);
    }

    #[tokio::test]
    async fn failed_batch_is_dropped_uncommitted() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let job = test_job(&AccountId::generate());

        store.create_job(&job).await.unwrap();

        let mut tx = StoreTx::new();
        tx.create_server(job.server.as_ref().unwrap());
        tx.create_job(&job); // collides
        assert!(store.commit(tx).await.is_err());

        assert!(matches!(
            store.get_server(&job.server_id).await,
            Err(StoreError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        let vault = Vault::new("redb-test-secret");
        let job = test_job(&AccountId::generate());

        {
            let store = RedbStore::open(&path, vault.clone()).unwrap();
            store.create_server(job.server.as_ref().unwrap()).await.unwrap();
        }

        {
            let store = RedbStore::open(&path, vault).unwrap();
            let server = store.get_server(&job.server_id).await.unwrap();
            assert_eq!(server.id, job.server_id);
        }
    }

    #[tokio::test]
    async fn deleted_provider_settings_leave_no_row() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let settings = ProviderSettings::new(
            AccountId::generate(),
            "personal",
            ProviderType::DigitalOcean,
            "do-token",
        );

        store.create_provider_settings(&settings).await.unwrap();
        store.delete_provider_settings(&settings.id).await.unwrap();

        assert!(matches!(
            store.get_provider_settings(&settings.id).await,
            Err(StoreError::ProviderSettingsNotFound(_))
        ));
        assert!(store.delete_provider_settings(&settings.id).await.is_err());
    }

    #[tokio::test]
    async fn wrong_vault_secret_fails_decryption_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        let job = test_job(&AccountId::generate());

        {
            let store = RedbStore::open(&path, Vault::new("original secret")).unwrap();
            store.create_server(job.server.as_ref().unwrap()).await.unwrap();
        }

        let store = RedbStore::open(&path, Vault::new("rotated secret")).unwrap();
        assert!(matches!(
            store.get_server(&job.server_id).await,
            Err(StoreError::Vault(_))
        ));
    }
}
