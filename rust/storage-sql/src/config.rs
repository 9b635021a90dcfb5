use serde::Deserialize;

/// Connection parameters for the relational backend, shared by the catalog
/// and the log store. Mirrors the `catalog.provider = relational` /
/// `log.provider = relational` connection fields from the process config.
#[derive(Deserialize, Clone, Debug)]
pub struct RelationalStoreConfig {
    pub username: String,
    pub password: String,
    pub address: String,
    pub port: u16,
    pub dbname: String,
    #[serde(default = "RelationalStoreConfig::default_max_idle_conns")]
    pub max_idle_conns: u32,
    #[serde(default = "RelationalStoreConfig::default_max_open_conns")]
    pub max_open_conns: u32,
}

impl RelationalStoreConfig {
    fn default_max_idle_conns() -> u32 {
        5
    }

    fn default_max_open_conns() -> u32 {
        20
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.address, self.port, self.dbname
        )
    }
}

/// The storage backend a component is configured to use. `Memory` is a
/// non-durable, single-process stand-in used for tests and local
/// development; `Relational` is the durable, ACID-transactional backend
/// used in production.
#[derive(Deserialize, Clone, Debug)]
pub enum StoreProviderConfig {
    #[serde(alias = "memory")]
    Memory,
    #[serde(alias = "relational")]
    Relational(RelationalStoreConfig),
}

impl Default for StoreProviderConfig {
    fn default() -> Self {
        StoreProviderConfig::Memory
    }
}
