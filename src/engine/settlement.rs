//! Reward settlement
//!
//! Two responsibilities: crediting a successful verification (multiplied
//! points, aggregate counters, level recompute, badge evaluation, activity
//! event) and claiming a completed record's rewards. Claims dispatch each
//! reward to its settlement path and persist the claim immediately after its
//! own successful dispatch, so a mid-batch collaborator failure never loses
//! or re-dispatches earlier rewards.

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::collaborators::{ActivityDispatcher, ActivityEvent, ChainSettlement, RoleGrant};
use crate::config::EngineConfig;
use crate::db::schemas::{
    ProgressRecordDoc, ProgressStatus, RewardInstance, RewardKind, TaskDefinitionDoc, UserDoc,
};
use crate::db::{ProgressRepository, UserStore};
use crate::engine::badges::BadgeEvaluator;
use crate::engine::machine::{self, SettlementPlan};
use crate::types::{QuestlineError, Result};

/// Platform whose connected account receives role grants
const ROLE_PLATFORM: &str = "discord";

/// One successfully claimed reward
#[derive(Debug, Clone)]
pub struct ClaimedReward {
    pub index: usize,
    pub kind: RewardKind,
    pub transaction_hash: Option<String>,
}

/// Result of a claim operation
#[derive(Debug, Clone, Default)]
pub struct ClaimOutcome {
    pub claimed: Vec<ClaimedReward>,
}

/// Dispatch a chain- or role-settled reward to its external collaborator.
/// Returns the transaction hash for chain-settled kinds; points and badge
/// rewards settle locally and return nothing here.
pub async fn dispatch_external(
    reward: &RewardInstance,
    user: &UserDoc,
    chain: &dyn ChainSettlement,
    roles: &dyn RoleGrant,
) -> Result<Option<String>> {
    match reward.kind {
        RewardKind::Nft => {
            let wallet = user.wallet_address.as_deref().ok_or_else(|| {
                QuestlineError::Validation("no wallet address on file".to_string())
            })?;
            let metadata = reward.nft_metadata.as_ref().ok_or_else(|| {
                QuestlineError::Validation("nft reward is missing metadata".to_string())
            })?;
            let tx = chain.mint_nft(wallet, metadata).await?;
            Ok(Some(tx))
        }
        RewardKind::Token => {
            let wallet = user.wallet_address.as_deref().ok_or_else(|| {
                QuestlineError::Validation("no wallet address on file".to_string())
            })?;
            let token = reward.token_address.as_deref().ok_or_else(|| {
                QuestlineError::Validation("token reward is missing a token address".to_string())
            })?;
            let amount = reward.amount.unwrap_or(0);
            let tx = chain.transfer_tokens(wallet, amount, token).await?;
            Ok(Some(tx))
        }
        RewardKind::Role => {
            let role_id = reward.role_id.as_deref().ok_or_else(|| {
                QuestlineError::Validation("role reward is missing a role id".to_string())
            })?;
            let external_id = user.connection(ROLE_PLATFORM).ok_or_else(|| {
                QuestlineError::Validation(format!("no {} account connected", ROLE_PLATFORM))
            })?;
            roles.grant_role(external_id, role_id).await?;
            Ok(None)
        }
        RewardKind::Points | RewardKind::Badge => Ok(None),
    }
}

/// Settlement service
pub struct SettlementService {
    users: UserStore,
    records: ProgressRepository,
    badges: Arc<BadgeEvaluator>,
    chain: Arc<dyn ChainSettlement>,
    roles: Arc<dyn RoleGrant>,
    dispatcher: Arc<dyn ActivityDispatcher>,
    config: EngineConfig,
}

impl SettlementService {
    pub fn new(
        users: UserStore,
        records: ProgressRepository,
        badges: Arc<BadgeEvaluator>,
        chain: Arc<dyn ChainSettlement>,
        roles: Arc<dyn RoleGrant>,
        dispatcher: Arc<dyn ActivityDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            users,
            records,
            badges,
            chain,
            roles,
            dispatcher,
            config,
        }
    }

    /// Credit a successful verification. Point and counter writes are atomic
    /// increments; the level write uses $max so it never decreases. Badge
    /// evaluation runs to completion before this returns, so the caller's
    /// success response reflects current badges.
    pub async fn settle_success(
        &self,
        record: &ProgressRecordDoc,
        task: &TaskDefinitionDoc,
        plan: &SettlementPlan,
    ) -> Result<()> {
        let user_id = record.user_id;

        self.users.credit_points(user_id, plan.final_points).await?;
        self.users.increment_tasks_completed(user_id).await?;

        // Reload for the level recompute so it sees the credited total
        let user = self.users.get(user_id).await?;
        let level = machine::level_for(user.points, self.config.points_per_level);
        self.users.raise_level(user_id, level).await?;

        self.badges.evaluate(user_id).await?;

        info!(
            user = %user_id,
            task = %task.title,
            points = plan.final_points,
            multiplier = plan.multiplier,
            streak = record.streak_count,
            "task completion settled"
        );

        let event = ActivityEvent::TaskCompleted {
            user_id: user_id.to_hex(),
            task_id: record.task_id.to_hex(),
            title: task.title.clone(),
            points_awarded: plan.final_points,
            streak: record.streak_count,
            at: DateTime::now().to_chrono(),
        };
        if let Err(e) = self.dispatcher.publish(event).await {
            warn!("task completion event publish failed: {}", e);
        }

        Ok(())
    }

    /// Claim every unclaimed reward on a completed record, in grant order.
    ///
    /// Each reward is dispatched to its settlement path, then its claim is
    /// persisted before the next reward is processed. A dispatch failure
    /// surfaces the error; rewards claimed before the failure stay claimed
    /// and a retry processes only the remainder.
    pub async fn claim(&self, user_id: ObjectId, task_id: ObjectId) -> Result<ClaimOutcome> {
        let record = self.records.get(user_id, task_id).await?;
        if record.status != ProgressStatus::Completed {
            return Err(QuestlineError::InvalidState(
                "rewards can only be claimed on a completed task".to_string(),
            ));
        }

        let unclaimed = record.unclaimed_indices();
        if unclaimed.is_empty() {
            return Err(QuestlineError::InvalidState(
                "no unclaimed rewards".to_string(),
            ));
        }

        let record_id = record
            ._id
            .ok_or_else(|| QuestlineError::Internal("record has no id".to_string()))?;
        let user = self.users.get(user_id).await?;
        let mut outcome = ClaimOutcome::default();

        for index in unclaimed {
            let reward = &record.rewards[index];
            let now = DateTime::now();

            let transaction_hash = match reward.kind {
                RewardKind::Points => {
                    self.users
                        .credit_points(user_id, reward.amount.unwrap_or(0))
                        .await?;
                    None
                }
                RewardKind::Badge => {
                    if let Some(badge_id) = reward.badge_id {
                        self.users.grant_badge(user_id, badge_id, now, 0).await?;
                    }
                    None
                }
                _ => match dispatch_external(reward, &user, self.chain.as_ref(), self.roles.as_ref())
                    .await
                {
                    Ok(tx) => tx,
                    Err(e) => {
                        warn!(
                            user = %user_id,
                            task = %task_id,
                            reward_index = index,
                            claimed_before_failure = outcome.claimed.len(),
                            "reward dispatch failed: {}",
                            e
                        );
                        return Err(e);
                    }
                },
            };

            self.records
                .mark_reward_claimed(record_id, index, now, transaction_hash.clone())
                .await?;

            outcome.claimed.push(ClaimedReward {
                index,
                kind: reward.kind,
                transaction_hash,
            });
        }

        info!(
            user = %user_id,
            task = %task_id,
            claimed = outcome.claimed.len(),
            "rewards claimed"
        );

        let event = ActivityEvent::RewardsClaimed {
            user_id: user_id.to_hex(),
            task_id: task_id.to_hex(),
            claimed: outcome.claimed.len(),
            at: DateTime::now().to_chrono(),
        };
        if let Err(e) = self.dispatcher.publish(event).await {
            warn!("claim event publish failed: {}", e);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LoggingRoleGrant, MockChainClient};
    use crate::db::schemas::{ConnectedAccount, NftMetadata};

    struct FailingChain;

    #[async_trait::async_trait]
    impl ChainSettlement for FailingChain {
        async fn mint_nft(&self, _target: &str, _metadata: &NftMetadata) -> Result<String> {
            Err(QuestlineError::ExternalDependency("mint node down".into()))
        }

        async fn transfer_tokens(
            &self,
            _target: &str,
            _amount: i64,
            _token_address: &str,
        ) -> Result<String> {
            Err(QuestlineError::ExternalDependency("rpc down".into()))
        }
    }

    fn wallet_user() -> UserDoc {
        UserDoc {
            wallet_address: Some("0xwallet".into()),
            connected_accounts: vec![ConnectedAccount {
                platform: "discord".into(),
                external_id: "1234".into(),
            }],
            ..Default::default()
        }
    }

    fn nft_reward() -> RewardInstance {
        RewardInstance {
            kind: RewardKind::Nft,
            nft_metadata: Some(NftMetadata {
                name: "Founders Medal".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_nft_dispatch_returns_tx_hash() {
        let chain = MockChainClient::default();
        let roles = LoggingRoleGrant::new();

        let tx = dispatch_external(&nft_reward(), &wallet_user(), &chain, &roles)
            .await
            .unwrap();
        assert!(tx.unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_nft_without_wallet_is_validation_error() {
        let chain = MockChainClient::default();
        let roles = LoggingRoleGrant::new();
        let user = UserDoc::default();

        let err = dispatch_external(&nft_reward(), &user, &chain, &roles)
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_token_dispatch() {
        let chain = MockChainClient::default();
        let roles = LoggingRoleGrant::new();
        let reward = RewardInstance {
            kind: RewardKind::Token,
            amount: Some(25),
            token_address: Some("0xtoken".into()),
            ..Default::default()
        };

        let tx = dispatch_external(&reward, &wallet_user(), &chain, &roles)
            .await
            .unwrap();
        assert!(tx.is_some());
    }

    #[tokio::test]
    async fn test_role_dispatch_has_no_tx_hash() {
        let chain = MockChainClient::default();
        let roles = LoggingRoleGrant::new();
        let reward = RewardInstance {
            kind: RewardKind::Role,
            role_id: Some("contributor".into()),
            ..Default::default()
        };

        let tx = dispatch_external(&reward, &wallet_user(), &chain, &roles)
            .await
            .unwrap();
        assert!(tx.is_none());
    }

    #[tokio::test]
    async fn test_role_without_connection_is_validation_error() {
        let chain = MockChainClient::default();
        let roles = LoggingRoleGrant::new();
        let reward = RewardInstance {
            kind: RewardKind::Role,
            role_id: Some("contributor".into()),
            ..Default::default()
        };
        let user = UserDoc {
            wallet_address: Some("0xwallet".into()),
            ..Default::default()
        };

        let err = dispatch_external(&reward, &user, &chain, &roles)
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_chain_outage_propagates_as_external_dependency() {
        let chain = FailingChain;
        let roles = LoggingRoleGrant::new();

        let err = dispatch_external(&nft_reward(), &wallet_user(), &chain, &roles)
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::ExternalDependency(_)));
    }

    #[tokio::test]
    async fn test_local_kinds_need_no_external_call() {
        let chain = FailingChain; // would error if called
        let roles = LoggingRoleGrant::new();
        let reward = RewardInstance {
            kind: RewardKind::Points,
            amount: Some(50),
            ..Default::default()
        };

        let tx = dispatch_external(&reward, &wallet_user(), &chain, &roles)
            .await
            .unwrap();
        assert!(tx.is_none());
    }
}
