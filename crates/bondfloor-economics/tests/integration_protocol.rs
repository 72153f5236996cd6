//! Integration tests for the Bondfloor protocol
//!
//! These tests drive a fully deployed and configured protocol through the
//! public `Protocol` API: market trades and credit, vote escrow, emissions,
//! gauges, bribes and transaction atomicity.

use bondfloor_economics::constants::{ONE, WEEK};
use bondfloor_economics::error::{Error, ErrorKind};
use bondfloor_economics::market::{MarketError, SwapParams};
use bondfloor_economics::minter::MinterError;
use bondfloor_economics::plugin::{PluginError, PluginKind, PluginSpec};
use bondfloor_economics::voter::VoterError;
use bondfloor_economics::vtoken::VTokenError;
use bondfloor_economics::{Address, Asset, Protocol, ProtocolConfig};

fn owner() -> Address {
    Address::from_label("owner")
}

fn user(i: u8) -> Address {
    Address::from_label(&format!("user{i}"))
}

fn protocol() -> Protocol {
    Protocol::deploy_and_setup(ProtocolConfig::default(), owner(), 0).unwrap()
}

fn swap(amount_in: u128, to: Address) -> SwapParams {
    SwapParams {
        amount_in,
        min_amount_out: 1,
        deadline: u64::MAX,
        to,
        referrer: None,
    }
}

fn assert_reserve_identity(p: &Protocol) {
    let market = p.market();
    let reserves = market.reserves();
    let base_balance = p.balance_of(p.base(), &market.address());
    assert_eq!(
        reserves.mrr_base,
        base_balance + market.debt_total() - reserves.fr_base
    );
    assert_eq!(reserves.mrr_token, p.balance_of(p.token(), &market.address()));
    assert!(p.reserves_consistent());
}

mod market_tests {
    use super::*;

    #[test]
    fn test_buy_then_sell_max_keeps_reserve_identity() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();

        let out = p.buy(&alice, swap(10 * ONE, alice)).unwrap();
        assert_eq!(p.balance_of(p.token(), &alice), out);
        assert_reserve_identity(&p);

        let max_sell = p.get_max_sell().unwrap();
        assert!(max_sell <= out);
        p.sell(&alice, swap(max_sell, alice)).unwrap();
        assert_reserve_identity(&p);
    }

    #[test]
    fn test_sell_beyond_max_fails() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();
        p.buy(&alice, swap(10 * ONE, alice)).unwrap();

        let max_sell = p.get_max_sell().unwrap();
        let err = p.sell(&alice, swap(max_sell + 1, alice)).unwrap_err();
        assert!(matches!(
            err,
            Error::Market(MarketError::ExceedsSwapMarketReserves { .. })
        ));
        assert_reserve_identity(&p);
    }

    #[test]
    fn test_buy_fee_raises_floor_and_pays_collector() {
        let mut p = protocol();
        let alice = user(0);
        let referrer = user(9);
        p.fund(p.base(), &alice, 100 * ONE).unwrap();

        let mut params = swap(100 * ONE, alice);
        params.referrer = Some(referrer);
        p.buy(&alice, params).unwrap();

        // 1 BASE fee: 20% to the referrer, half of the rest to the floor
        assert_eq!(p.balance_of(p.base(), &referrer), ONE / 5);
        assert_eq!(p.market().fr_base(), 2 * ONE / 5);
        assert_eq!(p.balance_of(p.base(), &p.addresses().fees), 2 * ONE / 5);
        assert_reserve_identity(&p);
    }

    #[test]
    fn test_expired_swap_fails() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();
        p.advance(100);

        let mut params = swap(10 * ONE, alice);
        params.deadline = 50;
        let err = p.buy(&alice, params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateMachine);
    }

    #[test]
    fn test_borrow_locks_stake_until_repaid() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();
        p.buy(&alice, swap(10 * ONE, alice)).unwrap();

        p.deposit(&alice, ONE).unwrap();
        let credit = p.get_account_credit(&alice).unwrap();
        assert_eq!(credit, ONE);
        p.borrow(&alice, credit).unwrap();
        assert_reserve_identity(&p);

        let err = p.withdraw(&alice, ONE).unwrap_err();
        assert_eq!(err, Error::VToken(VTokenError::CollateralActive));
        let err = p.withdraw(&alice, 1).unwrap_err();
        assert_eq!(err, Error::VToken(VTokenError::CollateralActive));

        let err = p.borrow(&alice, 1).unwrap_err();
        assert_eq!(err, Error::Market(MarketError::ExceedsBorrowCreditLimit));

        p.repay(&alice, credit).unwrap();
        assert_eq!(p.market().debt_of(&alice), 0);
        p.withdraw(&alice, ONE).unwrap();
        assert_reserve_identity(&p);
    }

    #[test]
    fn test_repay_more_than_owed_fails() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();
        p.buy(&alice, swap(10 * ONE, alice)).unwrap();
        p.deposit(&alice, ONE).unwrap();
        p.borrow(&alice, ONE).unwrap();

        let err = p.repay(&alice, 2 * ONE).unwrap_err();
        assert_eq!(
            err,
            Error::Market(MarketError::RepayExceedsDebt {
                amount: 2 * ONE,
                debt: ONE
            })
        );
        assert_eq!(p.market().debt_of(&alice), ONE);
    }

    #[test]
    fn test_zero_inputs_fail_distinctly() {
        let mut p = protocol();
        let alice = user(0);

        let borrow = p.borrow(&alice, 0).unwrap_err();
        assert_eq!(borrow, Error::Market(MarketError::InvalidZeroInput));
        assert_ne!(borrow, Error::Market(MarketError::ExceedsBorrowCreditLimit));

        let redeem = p.redeem(&alice, 0, &alice).unwrap_err();
        assert_eq!(redeem, Error::Market(MarketError::InvalidZeroInput));

        for err in [
            p.buy(&alice, swap(0, alice)).unwrap_err(),
            p.sell(&alice, swap(0, alice)).unwrap_err(),
            p.repay(&alice, 0).unwrap_err(),
            p.exercise(&alice, 0, &alice).unwrap_err(),
        ] {
            assert_eq!(err, Error::Market(MarketError::InvalidZeroInput));
        }
        assert_eq!(
            p.burn_for(&owner(), &alice, 0).unwrap_err(),
            Error::VToken(VTokenError::InvalidZeroInput)
        );
        assert_eq!(
            p.burn_for(&owner(), &Address::ZERO, ONE).unwrap_err(),
            Error::VToken(VTokenError::InvalidZeroAddress)
        );
    }

    #[test]
    fn test_exercise_then_redeem_against_floor() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &owner(), 10 * ONE).unwrap();

        p.exercise(&owner(), 10 * ONE, &alice).unwrap();
        assert_eq!(p.market().fr_base(), 10 * ONE);
        assert_eq!(p.balance_of(p.token(), &alice), 10 * ONE);
        assert_reserve_identity(&p);

        let err = p.redeem(&alice, 11 * ONE, &alice).unwrap_err();
        assert!(matches!(err, Error::Market(_)));

        p.redeem(&alice, 4 * ONE, &alice).unwrap();
        assert_eq!(p.market().fr_base(), 6 * ONE);
        assert_eq!(p.balance_of(p.base(), &alice), 4 * ONE);
        assert_reserve_identity(&p);
    }

    #[test]
    fn test_exercise_without_base_fails() {
        let mut p = protocol();
        let err = p.exercise(&owner(), ONE, &owner()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EconomicLimit);
        assert_eq!(p.market().fr_base(), 0);
    }
}

mod rewarder_tests {
    use super::*;

    #[test]
    fn test_fees_stream_to_stakers() {
        let mut p = protocol();
        let alice = user(0);
        let bob = user(1);
        p.fund(p.base(), &alice, 100 * ONE).unwrap();
        p.fund(p.base(), &bob, 1_000 * ONE).unwrap();

        let tokens = p.buy(&alice, swap(100 * ONE, alice)).unwrap();
        p.deposit(&alice, tokens).unwrap();
        p.buy(&bob, swap(1_000 * ONE, bob)).unwrap();

        let sent = p.distribute_fees().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, p.base());

        p.advance(WEEK);
        let before = p.balance_of(p.base(), &alice);
        let paid = p.get_reward(&alice).unwrap();
        assert_eq!(paid.len(), 1);
        let gained = p.balance_of(p.base(), &alice) - before;
        assert!(gained > 0);
        assert!(gained <= sent[0].1);
    }

    #[test]
    fn test_get_reward_with_nothing_accrued() {
        let mut p = protocol();
        let alice = user(0);
        let before = serde_json::to_string(&p).unwrap();
        assert!(p.get_reward(&alice).unwrap().is_empty());
        assert_eq!(serde_json::to_string(&p).unwrap(), before);
    }
}

mod voter_tests {
    use super::*;

    struct Deployment {
        p: Protocol,
        plugins: Vec<Address>,
    }

    fn spec(symbol: &str, bribe: Asset) -> PluginSpec {
        PluginSpec {
            underlying: Asset::external(symbol),
            protocol: "Protocol0".into(),
            symbol: symbol.into(),
            kind: PluginKind::Vault,
            tokens_in_underlying: vec![Asset::external(symbol)],
            bribe_tokens: vec![bribe],
        }
    }

    fn deployment() -> Deployment {
        let mut p = protocol();
        let base = p.base();
        let mut plugins = Vec::new();
        for symbol in ["xTEST0", "xTEST1", "xTEST2"] {
            let plugin = p.create_plugin(&owner(), spec(symbol, base)).unwrap();
            p.add_plugin(&owner(), &plugin).unwrap();
            plugins.push(plugin);
        }
        // Voting power from burned OTOKEN: 100, 300, 100
        p.burn_for(&owner(), &user(0), 100 * ONE).unwrap();
        p.burn_for(&owner(), &user(1), 300 * ONE).unwrap();
        p.burn_for(&owner(), &user(2), 100 * ONE).unwrap();
        Deployment { p, plugins }
    }

    fn gauge(p: &Protocol, plugin: &Address) -> Address {
        p.voter().gauge_of(plugin).unwrap()
    }

    #[test]
    fn test_distro_is_proportional_and_skips_killed() {
        let Deployment { mut p, plugins } = deployment();
        let otoken = p.otoken_asset();

        p.vote(&user(0), &plugins[0..1], &[1]).unwrap();
        p.vote(&user(1), &plugins[1..2], &[1]).unwrap();
        p.vote(&user(2), &plugins[2..3], &[1]).unwrap();
        assert_eq!(p.voter().total_weight(), 500 * ONE);

        let killed = gauge(&p, &plugins[2]);
        p.kill_gauge(&owner(), &killed).unwrap();
        assert_eq!(p.voter().total_weight(), 400 * ONE);

        p.advance(WEEK);
        let sent = p.distro().unwrap();
        assert_eq!(sent, 100_000 * ONE);

        let g0 = gauge(&p, &plugins[0]);
        let g1 = gauge(&p, &plugins[1]);
        assert_eq!(p.balance_of(otoken, &g0), 25_000 * ONE);
        assert_eq!(p.balance_of(otoken, &g1), 75_000 * ONE);
        assert_eq!(p.balance_of(otoken, &killed), 0);
        assert_eq!(p.voter().claimable(&killed).unwrap(), 0);
    }

    #[test]
    fn test_emission_without_votes_is_carried() {
        let Deployment { mut p, plugins } = deployment();
        p.advance(WEEK);
        assert_eq!(p.distro().unwrap(), 0);
        assert_eq!(p.voter().carried(), 100_000 * ONE);

        p.vote(&user(0), &plugins[0..1], &[1]).unwrap();
        p.advance(WEEK);
        // Second epoch emits 99_000 after decay, plus the carried 100_000
        assert_eq!(p.distro().unwrap(), 199_000 * ONE);
        assert_eq!(p.voter().carried(), 0);
    }

    #[test]
    fn test_revote_replaces_allocation() {
        let Deployment { mut p, plugins } = deployment();
        let used = p.vote(&user(1), &plugins[0..2], &[1, 2]).unwrap();
        assert!(used <= 300 * ONE);
        assert_eq!(p.voter().weight_of(&plugins[0]), 100 * ONE);
        assert_eq!(p.voter().weight_of(&plugins[1]), 200 * ONE);

        let err = p.vote(&user(1), &plugins[1..2], &[1]).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::AlreadyVotedThisEpoch));

        p.advance(WEEK);
        p.vote(&user(1), &plugins[1..2], &[1]).unwrap();
        assert_eq!(p.voter().weight_of(&plugins[0]), 0);
        assert_eq!(p.voter().weight_of(&plugins[1]), 300 * ONE);
        assert_eq!(p.voter().used_weight(&user(1)), 300 * ONE);
    }

    #[test]
    fn test_vote_input_errors() {
        let Deployment { mut p, plugins } = deployment();
        let err = p.vote(&user(0), &plugins, &[1]).unwrap_err();
        assert!(matches!(err, Error::Voter(VoterError::LengthMismatch { .. })));

        let err = p.vote(&user(5), &plugins[0..1], &[1]).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::ZeroVotingPower));

        let err = p.add_plugin(&owner(), &plugins[0]).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::PluginExists(plugins[0])));

        let err = p.kill_gauge(&user(0), &gauge(&p, &plugins[0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_plugin_deposit_earns_gauge_rewards() {
        let Deployment { mut p, plugins } = deployment();
        let depositor = user(7);
        let underlying = p.plugin(&plugins[0]).unwrap().underlying();
        p.fund(underlying, &depositor, 50 * ONE).unwrap();

        let err = p.plugin_deposit(&depositor, &plugins[0], &depositor, 0).unwrap_err();
        assert_eq!(err, Error::Plugin(PluginError::InvalidZeroInput));
        p.plugin_deposit(&depositor, &plugins[0], &depositor, 50 * ONE).unwrap();

        let err = p
            .plugin_withdraw(&depositor, &plugins[0], &depositor, 51 * ONE)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Plugin(PluginError::InsufficientBalance { .. })
        ));

        p.vote(&user(0), &plugins[0..1], &[1]).unwrap();
        p.advance(WEEK);
        p.distro().unwrap();
        p.advance(WEEK);

        let g0 = gauge(&p, &plugins[0]);
        let paid = p.claim_rewards(&depositor, &[g0]).unwrap();
        assert_eq!(paid.len(), 1);
        let otoken = p.otoken_asset();
        let earned = p.balance_of(otoken, &depositor);
        // Whole emission streamed to the only depositor, less rate rounding
        assert!(earned <= 100_000 * ONE);
        assert!(earned > 99_999 * ONE);

        // Nothing left to claim
        assert!(p.claim_rewards(&depositor, &[g0]).unwrap().is_empty());

        p.plugin_withdraw(&depositor, &plugins[0], &depositor, 50 * ONE)
            .unwrap();
        assert_eq!(p.balance_of(underlying, &depositor), 50 * ONE);
    }

    #[test]
    fn test_bribes_pay_voters() {
        let Deployment { mut p, plugins } = deployment();
        let base = p.base();
        let harvester = user(8);
        p.fund(base, &harvester, 70 * ONE).unwrap();

        p.vote(&user(0), &plugins[0..1], &[1]).unwrap();
        p.vote(&user(1), &plugins[0..1], &[1]).unwrap();

        p.deposit_bribe(&harvester, &plugins[0], base, 70 * ONE).unwrap();
        let sent = p.distribute_to_bribes(&plugins[0..1]).unwrap();
        assert_eq!(sent, vec![(plugins[0], base, 70 * ONE)]);

        p.advance(WEEK);
        let bribe = p.voter().bribe_of(&plugins[0]).unwrap();
        p.claim_bribes(&user(0), &[bribe]).unwrap();
        p.claim_bribes(&user(1), &[bribe]).unwrap();

        let a = p.balance_of(base, &user(0));
        let b = p.balance_of(base, &user(1));
        assert!(a > 17 * ONE && a <= 35 * ONE / 2);
        assert!(b > 52 * ONE && b <= 105 * ONE / 2);
    }

    #[test]
    fn test_claim_batch_is_all_or_nothing() {
        let Deployment { mut p, plugins } = deployment();
        let g0 = gauge(&p, &plugins[0]);
        let bogus = Address::from_label("bogus");

        let err = p.claim_rewards(&user(0), &[g0, bogus]).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::UnknownGauge(bogus)));
    }
}

mod setup_tests {
    use super::*;

    #[test]
    fn test_operations_fail_before_setup() {
        let mut p = Protocol::deploy(ProtocolConfig::default(), owner(), 0).unwrap();
        let plugin = p
            .create_plugin(
                &owner(),
                PluginSpec {
                    underlying: Asset::external("TEST0"),
                    protocol: "Protocol0".into(),
                    symbol: "TEST0".into(),
                    kind: PluginKind::Farm,
                    tokens_in_underlying: vec![],
                    bribe_tokens: vec![],
                },
            )
            .unwrap();

        let err = p.add_plugin(&owner(), &plugin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err = p.update_period().unwrap_err();
        assert_eq!(err, Error::Minter(MinterError::NotInitialized));

        let stranger = user(3);
        let err = p.initialize_voter(&stranger, p.addresses().minter).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::NotMinter(stranger)));
    }

    #[test]
    fn test_stepwise_setup_sequence() {
        use bondfloor_economics::factory::FactoryKind;

        let mut p = Protocol::deploy(ProtocolConfig::default(), owner(), 0).unwrap();
        let addresses = *p.addresses();
        p.set_factory_voter(&owner(), FactoryKind::Gauge, addresses.voter).unwrap();
        p.set_factory_voter(&owner(), FactoryKind::Bribe, addresses.voter).unwrap();
        for asset in [p.token(), p.otoken_asset(), p.base()] {
            p.add_vtoken_reward(&owner(), asset).unwrap();
        }
        p.set_vtoken_voter(&owner(), addresses.voter).unwrap();
        p.set_otoken_minter(&owner(), addresses.minter).unwrap();
        p.initialize_voter(&owner(), addresses.minter).unwrap();
        p.initialize_minter(&owner()).unwrap();

        let err = p.initialize_minter(&owner()).unwrap_err();
        assert_eq!(err, Error::Minter(MinterError::UnauthorizedInitializer));
        let err = p.initialize_voter(&owner(), addresses.minter).unwrap_err();
        assert_eq!(err, Error::Voter(VoterError::NotMinter(owner())));

        p.advance(WEEK);
        assert_eq!(p.update_period().unwrap(), 100_000 * ONE);
        assert_eq!(p.update_period().unwrap(), 0);
    }
}

mod atomicity_tests {
    use super::*;

    #[test]
    fn test_failed_batch_leaves_state_unchanged() {
        let mut p = protocol();
        let alice = user(0);
        p.fund(p.base(), &alice, 10 * ONE).unwrap();
        p.buy(&alice, swap(10 * ONE, alice)).unwrap();
        p.deposit(&alice, ONE).unwrap();
        p.borrow(&alice, ONE).unwrap();

        let before = serde_json::to_string(&p).unwrap();
        for err in [
            p.withdraw(&alice, ONE).unwrap_err(),
            p.repay(&alice, 2 * ONE).unwrap_err(),
            p.borrow(&alice, ONE).unwrap_err(),
            p.sell(&alice, swap(1_000 * ONE, alice)).unwrap_err(),
        ] {
            assert_ne!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(serde_json::to_string(&p).unwrap(), before);
    }
}
