//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Accounts with balances (key: account_id)
//! - `names` - Unique name index (key: name, value: account_id)
//! - `entries` - Append-only transfer log (key: sequence)
//! - `grants` - Append-only inventory grants (key: sequence)
//! - `indices` - Per-account log indices (key: account_id || tag || sequence)
//! - `meta` - Sequence counters and issued supply
//!
//! # Atomic units
//!
//! A unit reads through to the database and stages its writes in memory.
//! On success the staged writes become one `WriteBatch`, so readers see either
//! none or all of them. Units hold the writer lock from first read to commit,
//! which makes the balance check and the debit one serialized step.

use crate::{
    error::{Error, Result},
    store::{AccountStore, InventoryStore, LedgerStore, Store, Transaction},
    types::{Account, AccountId, CatalogItem, Coins, InventoryGrant, LedgerEntry, SupplySnapshot},
    Config,
};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_NAMES: &str = "names";
const CF_ENTRIES: &str = "entries";
const CF_GRANTS: &str = "grants";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

/// Meta keys
const META_NEXT_ENTRY: &[u8] = b"next_entry_seq";
const META_NEXT_GRANT: &[u8] = b"next_grant_seq";
const META_ISSUED: &[u8] = b"issued";

/// Index tags
const TAG_ENTRY: u8 = b'e';
const TAG_GRANT: u8 = b'g';

/// RocksDB-backed store
pub struct RocksStore {
    db: Arc<DB>,
    // Single writer: serializes atomic units and registrations
    writer: Mutex<()>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_NAMES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_GRANTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened wallet store");

        Ok(Self {
            db: Arc::new(db),
            writer: Mutex::new(()),
            lock_timeout: config.wallet.lock_timeout(),
        })
    }

    // Column family options

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        // Hot, small values: LZ4 plus bloom filters
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn lock_writer(&self, timeout: Duration) -> Result<MutexGuard<'_, ()>> {
        self.writer
            .try_lock_for(timeout)
            .ok_or(Error::Timeout(timeout))
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Sequences indexed under `account || tag`, in ascending order
    fn indexed_sequences(&self, id: &AccountId, tag: u8) -> Result<Vec<u64>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix(id, tag);

        let mut sequences = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            sequences.push(decode_u64(&key[prefix.len()..])?);
        }

        Ok(sequences)
    }

    fn get_logged<T: serde::de::DeserializeOwned>(&self, cf_name: &str, sequence: u64) -> Result<T> {
        let cf = self.cf_handle(cf_name)?;
        let value = self
            .db
            .get_cf(cf, sequence.to_be_bytes())?
            .ok_or_else(|| {
                Error::InvariantViolation(format!("{} index points at missing {}", cf_name, sequence))
            })?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Wallet store closed");
        Ok(())
    }
}

impl AccountStore for RocksStore {
    fn create_account(&self, name: &str, initial_balance: Coins) -> Result<Account> {
        let _writer = self.lock_writer(self.lock_timeout)?;

        let cf_names = self.cf_handle(CF_NAMES)?;
        if self.db.get_cf(cf_names, name.as_bytes())?.is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let issued = self
            .read_counter(META_ISSUED)?
            .checked_add(initial_balance)
            .ok_or_else(|| Error::InvariantViolation("issued supply overflow".to_string()))?;

        let account = Account {
            id: AccountId::generate(),
            name: name.to_string(),
            balance: initial_balance,
            created_at: Utc::now(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf_handle(CF_ACCOUNTS)?,
            account.id.as_bytes(),
            bincode::serialize(&account)?,
        );
        batch.put_cf(cf_names, name.as_bytes(), account.id.as_bytes());
        batch.put_cf(self.cf_handle(CF_META)?, META_ISSUED, issued.to_be_bytes());
        self.db.write(batch)?;

        tracing::info!(account = %account.id, name = %account.name, balance = initial_balance, "Account created");

        Ok(account)
    }

    fn account(&self, id: &AccountId) -> Result<Account> {
        self.get_account(id)?
            .ok_or_else(|| Error::NoSuchUser(id.to_string()))
    }

    fn account_by_name(&self, name: &str) -> Result<Account> {
        let cf = self.cf_handle(CF_NAMES)?;
        let id_bytes = self
            .db
            .get_cf(cf, name.as_bytes())?
            .ok_or_else(|| Error::NoSuchUser(name.to_string()))?;
        let id = decode_account_id(&id_bytes)?;

        // Name index and account are written in one batch
        self.get_account(&id)?.ok_or_else(|| {
            Error::InvariantViolation(format!("name {} points at missing account {}", name, id))
        })
    }

    fn accounts(&self, ids: &BTreeSet<AccountId>) -> Result<HashMap<AccountId, Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let keys: Vec<_> = ids.iter().map(|id| (cf, id.as_bytes().to_vec())).collect();

        let mut found = HashMap::with_capacity(ids.len());
        for (id, value) in ids.iter().zip(self.db.multi_get_cf(keys)) {
            let bytes = value?.ok_or_else(|| Error::NoSuchUser(id.to_string()))?;
            found.insert(*id, bincode::deserialize(&bytes)?);
        }

        Ok(found)
    }
}

impl LedgerStore for RocksStore {
    fn entries_for(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.indexed_sequences(id, TAG_ENTRY)?
            .into_iter()
            .map(|sequence| self.get_logged(CF_ENTRIES, sequence))
            .collect()
    }
}

impl InventoryStore for RocksStore {
    fn grants_for(&self, id: &AccountId) -> Result<Vec<InventoryGrant>> {
        self.indexed_sequences(id, TAG_GRANT)?
            .into_iter()
            .map(|sequence| self.get_logged(CF_GRANTS, sequence))
            .collect()
    }
}

impl Store for RocksStore {
    fn atomically<T, F>(&self, timeout: Duration, unit: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let _writer = self.lock_writer(timeout)?;

        let mut txn = RocksTxn::new(self)?;
        let output = unit(&mut txn)?;
        txn.commit()?;

        Ok(output)
    }

    fn supply(&self) -> Result<SupplySnapshot> {
        let snapshot = self.db.snapshot();

        let issued = match snapshot.get_cf(self.cf_handle(CF_META)?, META_ISSUED)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };

        let mut circulating = 0u64;
        for item in snapshot.iterator_cf(self.cf_handle(CF_ACCOUNTS)?, IteratorMode::Start) {
            let (_, value) = item?;
            let account: Account = bincode::deserialize(&value)?;
            circulating = circulating.checked_add(account.balance).ok_or_else(|| {
                Error::InvariantViolation("circulating supply overflow".to_string())
            })?;
        }

        let mut spent = 0u64;
        for item in snapshot.iterator_cf(self.cf_handle(CF_GRANTS)?, IteratorMode::Start) {
            let (_, value) = item?;
            let grant: InventoryGrant = bincode::deserialize(&value)?;
            spent = spent
                .checked_add(grant.price)
                .ok_or_else(|| Error::InvariantViolation("spent supply overflow".to_string()))?;
        }

        Ok(SupplySnapshot {
            issued,
            circulating,
            spent,
        })
    }
}

/// Staged unit against the RocksDB store. Only built while the writer lock is held.
struct RocksTxn<'a> {
    store: &'a RocksStore,
    accounts: HashMap<AccountId, Account>,
    entries: Vec<LedgerEntry>,
    grants: Vec<InventoryGrant>,
    next_entry: u64,
    next_grant: u64,
}

impl<'a> RocksTxn<'a> {
    fn new(store: &'a RocksStore) -> Result<Self> {
        Ok(Self {
            store,
            accounts: HashMap::new(),
            entries: Vec::new(),
            grants: Vec::new(),
            next_entry: store.read_counter(META_NEXT_ENTRY)?,
            next_grant: store.read_counter(META_NEXT_GRANT)?,
        })
    }

    fn commit(self) -> Result<()> {
        if self.accounts.is_empty() && self.entries.is_empty() && self.grants.is_empty() {
            return Ok(());
        }

        let store = self.store;
        let cf_accounts = store.cf_handle(CF_ACCOUNTS)?;
        let cf_entries = store.cf_handle(CF_ENTRIES)?;
        let cf_grants = store.cf_handle(CF_GRANTS)?;
        let cf_indices = store.cf_handle(CF_INDICES)?;
        let cf_meta = store.cf_handle(CF_META)?;

        let mut batch = WriteBatch::default();

        // 1. Balances
        for account in self.accounts.values() {
            batch.put_cf(cf_accounts, account.id.as_bytes(), bincode::serialize(account)?);
        }

        // 2. Transfer log + sender/receiver indices
        for entry in &self.entries {
            batch.put_cf(cf_entries, entry.sequence.to_be_bytes(), bincode::serialize(entry)?);
            batch.put_cf(cf_indices, index_key(&entry.sender, TAG_ENTRY, entry.sequence), b"");
            batch.put_cf(cf_indices, index_key(&entry.receiver, TAG_ENTRY, entry.sequence), b"");
        }

        // 3. Grants + owner index
        for grant in &self.grants {
            batch.put_cf(cf_grants, grant.sequence.to_be_bytes(), bincode::serialize(grant)?);
            batch.put_cf(cf_indices, index_key(&grant.owner, TAG_GRANT, grant.sequence), b"");
        }

        // 4. Counters
        batch.put_cf(cf_meta, META_NEXT_ENTRY, self.next_entry.to_be_bytes());
        batch.put_cf(cf_meta, META_NEXT_GRANT, self.next_grant.to_be_bytes());

        // Atomic commit
        store.db.write(batch)?;

        tracing::debug!(
            accounts = self.accounts.len(),
            entries = self.entries.len(),
            grants = self.grants.len(),
            "Atomic unit committed"
        );

        Ok(())
    }
}

impl Transaction for RocksTxn<'_> {
    fn account_for_update(&mut self, id: &AccountId) -> Result<Account> {
        if let Some(account) = self.accounts.get(id) {
            return Ok(account.clone());
        }

        let account = self.store.account(id)?;
        self.accounts.insert(*id, account.clone());
        Ok(account)
    }

    fn put_balance(&mut self, id: &AccountId, balance: Coins) -> Result<()> {
        let mut account = self.account_for_update(id)?;
        account.balance = balance;
        self.accounts.insert(*id, account);
        Ok(())
    }

    fn append_entry(
        &mut self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            sequence: self.next_entry,
            sender: *sender,
            receiver: *receiver,
            amount,
            created_at: Utc::now(),
        };
        self.next_entry += 1;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn append_grant(&mut self, owner: &AccountId, item: &CatalogItem) -> Result<InventoryGrant> {
        let grant = InventoryGrant {
            sequence: self.next_grant,
            owner: *owner,
            item: item.name.clone(),
            price: item.price,
            acquired_at: Utc::now(),
        };
        self.next_grant += 1;
        self.grants.push(grant.clone());
        Ok(grant)
    }
}

// Key helpers

fn index_prefix(id: &AccountId, tag: u8) -> Vec<u8> {
    let mut key = id.as_bytes().to_vec();
    key.push(tag);
    key
}

fn index_key(id: &AccountId, tag: u8, sequence: u64) -> Vec<u8> {
    let mut key = index_prefix(id, tag);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 8-byte counter, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_account_id(bytes: &[u8]) -> Result<AccountId> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 16-byte account id, got {}", bytes.len())))?;
    Ok(AccountId::from_uuid(uuid::Uuid::from_bytes(raw)))
}
