// tests/transactional_macro.rs
// Exercises the `#[transactional]` attribute macro itself (as opposed
// to `tests/aspect_scenarios.rs`, which drives the aspect directly).
// Each test installs its datasource under a name unique to that test so
// that running alongside other tests sharing the process-wide
// `TransactionManager` singleton can't cross-contaminate call logs.

use std::sync::Arc;

use txn_aspect::testing::MockDataSource;
use txn_aspect::{TransactionManager, is_in_transaction};

struct Ledger {
    datasource: &'static str,
}

impl Ledger {
    #[txn_aspect::transactional(datasource = "MACRO_COMMIT_DS")]
    async fn deposit(&self, amount: i64) -> anyhow::Result<i64> {
        assert!(is_in_transaction());
        Ok(amount * 2)
    }

    #[txn_aspect::transactional(propagation = "requires_new", read_only, datasource = "MACRO_COMMIT_DS", isolation = "serializable")]
    async fn snapshot(&self) -> anyhow::Result<&'static str> {
        assert!(is_in_transaction());
        Ok(self.datasource)
    }

    #[txn_aspect::transactional(datasource = "MACRO_ROLLBACK_DS")]
    async fn withdraw(&self, amount: i64) -> anyhow::Result<i64> {
        if amount > 100 {
            anyhow::bail!("insufficient funds");
        }
        Ok(amount)
    }
}

#[tokio::test]
async fn macro_wrapped_method_commits_and_returns_the_body_value() {
    let manager = TransactionManager::global();
    manager.metadata().install("MACRO_COMMIT_DS", Arc::new(MockDataSource::new()));

    let ledger = Ledger { datasource: "MACRO_COMMIT_DS" };
    assert!(!is_in_transaction());
    let result = ledger.deposit(21).await.unwrap();
    assert_eq!(result, 42);
    assert!(!is_in_transaction());

    let label = ledger.snapshot().await.unwrap();
    assert_eq!(label, "MACRO_COMMIT_DS");

    manager.metadata().remove("MACRO_COMMIT_DS");
}

#[tokio::test]
async fn macro_wrapped_method_propagates_the_bodys_own_error_type() {
    let manager = TransactionManager::global();
    manager.metadata().install("MACRO_ROLLBACK_DS", Arc::new(MockDataSource::new()));

    let ledger = Ledger { datasource: "MACRO_ROLLBACK_DS" };
    let err = ledger.withdraw(500).await.unwrap_err();
    assert!(err.to_string().contains("insufficient funds"));

    manager.metadata().remove("MACRO_ROLLBACK_DS");
}
