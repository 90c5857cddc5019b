pub mod challenge;
pub mod ledger;
pub mod registration;
pub mod verification;

pub use challenge::{ChallengeResponder, ChallengeValidator};
pub use ledger::{ChallengeLedger, ChallengeOutcome, NodeChallengeStats};
pub use registration::{create_server_coin_memo, current_epoch, verify_server_coin_memo};
pub use verification::{
    evaluate_response, validate_challenge_response, verify_proof_bundle, verify_vdf_result,
    verify_vdf_result_with_seed, BundleContext, ValidationContext,
};
