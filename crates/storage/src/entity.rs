use hackwatch_domain::model::Chain;

/// Column representation of [`Chain`], shared by both tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, sea_orm::EnumIter, sea_orm::DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum ChainDb {
    #[sea_orm(string_value = "bitcoin")]
    Bitcoin,
    #[sea_orm(string_value = "ethereum")]
    Ethereum,
}

impl From<Chain> for ChainDb {
    fn from(value: Chain) -> Self {
        match value {
            Chain::Bitcoin => ChainDb::Bitcoin,
            Chain::Ethereum => ChainDb::Ethereum,
        }
    }
}

impl From<ChainDb> for Chain {
    fn from(value: ChainDb) -> Self {
        match value {
            ChainDb::Bitcoin => Chain::Bitcoin,
            ChainDb::Ethereum => Chain::Ethereum,
        }
    }
}

pub mod addresses {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    use super::ChainDb;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "addresses")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub address: String,
        pub blockchain: ChainDb,
        pub last_checked_block: i64,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod transactions {
    use sea_orm::entity::prelude::*;

    use super::ChainDb;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "transactions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub blockchain: ChainDb,
        #[sea_orm(primary_key, auto_increment = false)]
        pub tx_hash: String,
        pub from_address: String,
        /// Destination addresses joined with `", "`.
        pub to_address: String,
        pub amount: String,
        pub token_name: String,
        pub block_number: i64,
        pub destination: String,
        pub alert_pending: bool,
        pub detected_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod monitor_state {
    use sea_orm::entity::prelude::*;

    /// Single row (`id = 1`) describing the most recent cycle.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "monitor_state")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i32,
        pub status: String,
        pub last_run: DateTimeUtc,
        pub last_completed: Option<DateTimeUtc>,
        pub last_error: Option<String>,
        /// JSON-encoded cycle report.
        #[sea_orm(column_type = "Text", nullable)]
        pub last_report: Option<String>,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
