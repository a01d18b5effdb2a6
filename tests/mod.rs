use std::sync::Arc;

use alloy::primitives::{Bytes, B256, U256};
use tracing::info;

mod utils;
use utils::{operators, signed_key, unvalidated, without_keys, StubChain, LATEST_BLOCK};

use lido_registry::{
    AbiOverride, Chain, ChainConfig, ConfigError, Error, FilesystemRegistry, KeyValidator, Lido,
    LidoOptions, MulticallError, Operator, Registry, RegistryError, SigningKey,
    ValidationContext, ValidationMode, WithdrawalPolicy, MAX_OPERATORS,
};

fn goerli() -> ChainConfig {
    ChainConfig::from(Chain::Goerli)
}

fn stub(config: ChainConfig, count: u64, keys: u64) -> Arc<StubChain> {
    let live = config.withdrawal_credentials[0];
    let operators = operators(&config, count, keys, live);
    Arc::new(StubChain::new(config, operators, live))
}

async fn connect(chain: &Arc<StubChain>) -> eyre::Result<Lido> {
    Ok(Lido::connect(chain.clone(), LidoOptions::default()).await?)
}

fn valid_flags(operators: &[Operator]) -> Vec<Option<bool>> {
    operators.iter().flat_map(|op| op.keys.iter().map(|k| k.valid_signature)).collect()
}

#[tokio::test]
async fn test_fetch_operators() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    for count in [0, 1, 4] {
        let chain = stub(goerli(), count, 2);
        let lido = connect(&chain).await?;

        let operators = lido.fetch_operators().await?;
        info!(count, fetched = operators.len(), "Fetched operators");

        assert_eq!(operators, without_keys(&chain.operators));
        let ids = operators.iter().map(|op| op.id).collect::<Vec<_>>();
        assert_eq!(ids, (0..count).collect::<Vec<_>>());
        // count call, then one aggregated batch unless there is nothing to fetch
        assert_eq!(chain.requests(), if count == 0 { 1 } else { 2 });
    }

    Ok(())
}

#[tokio::test]
async fn test_fetch_keys_is_independent_of_batch_size() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let keys = 5;
    let chain = stub(goerli(), 3, keys);
    let expected = unvalidated(&chain.operators);

    for batch_size in [1, keys as usize, keys as usize + 1] {
        let lido = connect(&chain).await?;
        let operators = lido.fetch_operators().await?;

        chain.reset_requests();
        let fetched = lido.registry().fetch_keys(operators, batch_size).await?;

        assert_eq!(fetched, expected);
        for operator in &fetched {
            let indices = operator.keys.iter().map(|k| k.index).collect::<Vec<_>>();
            assert_eq!(indices, (0..keys).collect::<Vec<_>>());
        }
        // batches never span operators
        assert_eq!(chain.requests(), 3 * (keys as usize).div_ceil(batch_size));
    }

    Ok(())
}

#[tokio::test]
async fn test_fetch_and_validate() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let chain = stub(goerli(), 3, 4);
    let lido = connect(&chain).await?;

    let operators =
        lido.fetch_and_validate(WithdrawalPolicy::Strict, ValidationMode::Pooled).await?;

    assert_eq!(operators.len(), 3);
    assert!(valid_flags(&operators).iter().all(|valid| *valid == Some(true)));
    assert!(operators.iter().flat_map(|op| &op.keys).all(|key| !key.duplicate));

    Ok(())
}

#[tokio::test]
async fn test_validation_is_idempotent() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = goerli();
    let live = config.withdrawal_credentials[0];
    let mut operators = operators(&config, 2, 3, live);
    // a key signed for other credentials, and a correct key pre-marked invalid
    operators[0].keys[1] = signed_key(&config, 99, 1, B256::repeat_byte(9), true);
    operators[1].keys[2].valid_signature = Some(false);
    let chain = Arc::new(StubChain::new(config, operators.clone(), live));
    let lido = connect(&chain).await?;

    let validator = lido.key_validator(WithdrawalPolicy::Loose).await?;
    let (first, summary) =
        lido.validate_keys(operators, &validator, ValidationMode::Pooled).await?;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(
        valid_flags(&first),
        vec![Some(true), Some(false), Some(true), Some(true), Some(true), Some(false)]
    );

    let (second, summary) =
        lido.validate_keys(first.clone(), &validator, ValidationMode::Pooled).await?;
    assert_eq!(summary.checked, 0);
    assert_eq!(second, first);

    Ok(())
}

#[tokio::test]
async fn test_serial_and_pooled_validation_agree() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = goerli();
    let live = config.withdrawal_credentials[0];
    let mut operators = operators(&config, 4, 6, live);
    operators[2].keys[3] = signed_key(&config, 77, 3, B256::repeat_byte(1), false);
    operators[3].keys[0].deposit_signature = Bytes::from_static(&[0xc0; 96]);
    let chain = Arc::new(StubChain::new(config, operators.clone(), live));
    let lido = connect(&chain).await?;

    let serial = lido.validate_keys_serial(operators.clone()).await?;
    let pooled = lido.validate_keys_pooled(operators).await?;

    assert_eq!(serde_json::to_vec(&serial)?, serde_json::to_vec(&pooled)?);
    assert_eq!(serial[2].keys[3].valid_signature, Some(false));
    assert_eq!(serial[3].keys[0].valid_signature, Some(false));

    Ok(())
}

#[tokio::test]
async fn test_validators_reuse_the_client_pool() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let chain = stub(goerli(), 2, 2);
    let lido = connect(&chain).await?;

    let first = lido.key_validator(WithdrawalPolicy::Loose).await?;
    let second = lido.clone().key_validator(WithdrawalPolicy::Strict).await?;
    assert!(Arc::ptr_eq(first.pool().unwrap(), second.pool().unwrap()));

    let operators = lido.fetch_operators().await?;
    let operators = lido.fetch_keys(operators).await?;
    let validated = lido.validate_keys_serial(operators).await?;
    assert!(valid_flags(&validated).iter().all(|valid| *valid == Some(true)));

    Ok(())
}

#[tokio::test]
async fn test_loose_policy_accepts_historical_credentials() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = ChainConfig::from(Chain::Ropsten);
    let (live, old) = (config.withdrawal_credentials[0], config.withdrawal_credentials[3]);
    let keys = vec![
        signed_key(&config, 1, 0, live, true),
        signed_key(&config, 2, 1, old, true),
        signed_key(&config, 3, 2, old, false),
    ];

    let validate = |policy| {
        let context = ValidationContext::from_config(&config, live, policy);
        let validator = KeyValidator::with_threads(context, 2).unwrap();
        let mut operators = vec![Operator {
            total_signing_keys: 3,
            keys: keys.clone(),
            ..Default::default()
        }];
        validator.validate_pooled(&mut operators);
        valid_flags(&operators)
    };

    assert_eq!(validate(WithdrawalPolicy::Loose), vec![Some(true), Some(true), Some(false)]);
    assert_eq!(validate(WithdrawalPolicy::Strict), vec![Some(true), Some(false), Some(false)]);

    Ok(())
}

#[tokio::test]
async fn test_prater_keys_only_verify_on_prater() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let snapshot =
        FilesystemRegistry::read_from_file("tests/fixtures/prater_operators.json".into())?;
    let operators = snapshot.operators_with_keys().await?;
    assert_eq!(operators.len(), 3);

    let goerli = goerli();
    let context = ValidationContext::from_config(
        &goerli,
        goerli.withdrawal_credentials[0],
        WithdrawalPolicy::Strict,
    );
    let mut on_prater = operators.clone();
    KeyValidator::new(context)?.validate_serial(&mut on_prater);
    assert!(valid_flags(&on_prater).iter().all(|valid| *valid == Some(true)));

    let mainnet = ChainConfig::from(Chain::Mainnet);
    let context = ValidationContext::from_config(
        &mainnet,
        mainnet.withdrawal_credentials[0],
        WithdrawalPolicy::Strict,
    );
    let mut on_mainnet = operators;
    KeyValidator::new(context)?.validate_serial(&mut on_mainnet);
    assert!(valid_flags(&on_mainnet).iter().all(|valid| *valid == Some(false)));

    Ok(())
}

#[tokio::test]
async fn test_duplicates_across_operators() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = goerli();
    let live = config.withdrawal_credentials[0];
    let mut operators = operators(&config, 3, 3, live);
    let shared = operators[0].keys[1].clone();
    operators[1].keys[0] = SigningKey { index: 0, ..shared.clone() };
    operators[2].keys[2] = SigningKey { index: 2, used: false, ..shared };
    operators[1].staking_limit = 0;
    let chain = Arc::new(StubChain::new(config, operators, live));
    let lido = connect(&chain).await?;

    let operators =
        lido.fetch_and_validate(WithdrawalPolicy::Loose, ValidationMode::Pooled).await?;

    let flagged = operators
        .iter()
        .flat_map(|op| op.keys.iter().filter(|k| k.duplicate).map(move |k| (op.id, k.index)))
        .collect::<Vec<_>>();
    assert_eq!(flagged, vec![(0, 1), (1, 0), (2, 2)]);

    let refs = |op: usize, index: usize| {
        operators[op].keys[index]
            .duplicates
            .iter()
            .map(|d| (d.op_id, d.index, d.approved, d.used))
            .collect::<Vec<_>>()
    };
    assert_eq!(refs(0, 1), vec![(1, 0, false, false), (2, 2, true, false)]);
    assert_eq!(refs(1, 0), vec![(0, 1, true, false), (2, 2, true, false)]);
    assert_eq!(refs(2, 2), vec![(0, 1, true, false), (1, 0, false, false)]);

    Ok(())
}

#[tokio::test]
async fn test_failed_batch_aborts_fetch() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let chain = stub(goerli(), 3, 4);
    let lido = connect(&chain).await?;

    // count, operators, then the key batches of operator 0 and 1
    chain.fail_request(3);
    let err = lido
        .fetch_and_validate(WithdrawalPolicy::Loose, ValidationMode::Serial)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Registry(RegistryError::Multicall(MulticallError::Transport(_)))
    ));

    Ok(())
}

#[tokio::test]
async fn test_implausible_operator_count() -> eyre::Result<()> {
    let config = goerli();
    let live = config.withdrawal_credentials[0];
    let mut chain = StubChain::new(config, Vec::new(), live);
    chain.reported_count = Some(MAX_OPERATORS);
    let chain = Arc::new(chain);
    let lido = connect(&chain).await?;

    let err = lido.fetch_operators().await.unwrap_err();
    let expected = U256::from(MAX_OPERATORS);
    assert!(matches!(
        err,
        Error::Registry(RegistryError::TooManyOperators(count)) if count == expected
    ));
    // nothing is aggregated after the count
    assert_eq!(chain.requests(), 1);

    Ok(())
}

#[tokio::test]
async fn test_connect_checks_chain() -> eyre::Result<()> {
    let unknown = ChainConfig { chain_id: 1337, ..goerli() };
    let chain = stub(unknown.clone(), 0, 0);

    let err = Lido::connect(chain.clone(), LidoOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UnsupportedChain(1337))));
    assert_eq!(chain.requests(), 0);

    // an explicit configuration makes the chain usable
    let options = LidoOptions { chain_config: Some(unknown), ..Default::default() };
    let lido = Lido::connect(chain.clone(), options).await?;
    assert!(lido.fetch_operators().await?.is_empty());

    let options = LidoOptions { chain_config: Some(goerli()), ..Default::default() };
    let err = Lido::connect(chain, options).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::ChainMismatch { expected: 5, got: 1337 })
    ));

    Ok(())
}

#[tokio::test]
async fn test_registry_abi_override() -> eyre::Result<()> {
    let chain = stub(goerli(), 0, 0);

    let abi = AbiOverride::from_json(
        r#"[{
            "type": "function",
            "name": "getNodeOperatorsCount",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [{"name": "", "type": "uint256"}]
        }]"#,
    )?;
    let options = LidoOptions { registry_abi: Some(abi), ..Default::default() };

    let err = Lido::connect(chain, options).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::MissingFunction(name)) if name == "getNodeOperator"
    ));

    Ok(())
}

#[tokio::test]
async fn test_fetch_stats() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let chain = stub(goerli(), 0, 0);
    let lido = connect(&chain).await?;

    let stats = lido.fetch_stats().await?;
    info!(?stats, "Fetched stats");

    assert!(!stats.is_stopped);
    assert_eq!(stats.withdrawal_credentials, chain.live_credentials);
    assert_eq!(stats.fee, 1000);
    assert_eq!(stats.fee_distribution.operators_fee_basis_points, 5000);
    assert_eq!(stats.beacon_stat.beacon_validators, U256::from(59_000));
    assert_eq!(stats.actuality.last_block, LATEST_BLOCK.number);
    assert_eq!(stats.actuality.last_blocktime, LATEST_BLOCK.timestamp);
    // all seven functions in one aggregated request
    assert_eq!(chain.requests(), 1);

    Ok(())
}
