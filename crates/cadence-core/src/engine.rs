//! Recurring-pattern engine
//!
//! Orchestrates the detectors, reconciler, AI backend, and persistence into
//! the operations the presentation layer consumes. Each call is stateless:
//! it fetches a snapshot of persisted state up front, computes against it,
//! and writes results back. The only shared state is the per-user analysis
//! cache, which tolerates concurrent callers because a lost write just means
//! one extra recompute.

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient, MerchantSummary};
use crate::db::{CachedAnalysis, Database, NewIncomeSource, NewSuggestion};
use crate::detect::{
    analyze_merchant_group, detect_basic, group_candidates, DetectedPattern, Direction,
    MIN_OCCURRENCES_AI,
};
use crate::error::{Error, Result};
use crate::models::{
    AnalysisOutcome, BatchActionSummary, IgnoreScope, NewPattern, NewTransaction, PatternSource,
    RecurringOverview, RecurringPattern, SuggestionAction, SuggestionStatus, Transaction,
};
use crate::normalize::{
    extract_keywords, keys_match_loose, merchant_key, transaction_key, INCOME_KEY_TOKENS,
    MATCH_KEY_TOKENS,
};
use crate::reconcile::{reconcile, yearly_spend_estimate, ReconcileInputs};
use crate::schedule::project_next;
use crate::stats::GroupStats;
use crate::taxonomy;

/// Engine tuning knobs, grouped so call sites never embed magic numbers
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum transaction count before AI-assisted analysis is worthwhile
    pub min_history: i64,
    /// How long a cached analysis stays fresh
    pub cache_ttl: Duration,
    /// How far back the analysis window reaches
    pub window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_history: 10,
            cache_ttl: Duration::hours(24),
            window_days: 365,
        }
    }
}

/// The engine: one instance per process, cheap to clone
#[derive(Clone)]
pub struct RecurringEngine {
    db: Database,
    ai: Option<AIClient>,
    config: EngineConfig,
}

impl RecurringEngine {
    pub fn new(db: Database, ai: Option<AIClient>) -> Self {
        Self {
            db,
            ai,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(db: Database, ai: Option<AIClient>, config: EngineConfig) -> Self {
        Self { db, ai, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn ai(&self) -> Option<&AIClient> {
        self.ai.as_ref()
    }

    fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.config.window_days)
    }

    /// Cached analysis, if present and still fresh
    fn fresh_cache(&self, user_id: &str) -> Option<CachedAnalysis> {
        let cached = match self.db.get_cached_analysis(user_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read analysis cache, treating as miss");
                None
            }
        };
        cached.filter(|c| Utc::now() - c.analyzed_at < self.config.cache_ttl)
    }

    /// The read operation: reconcile everything known about a user into the
    /// final recurring-item list.
    ///
    /// Never calls the model. Non-essential sub-queries (dismissals, income
    /// sources) degrade to empty sets on failure rather than failing the
    /// whole read.
    pub fn overview(&self, user_id: &str, today: NaiveDate) -> Result<RecurringOverview> {
        let transactions = self
            .db
            .list_transactions_since(user_id, self.window_start(today))?;
        let confirmed = self.db.list_patterns(user_id)?;

        let dismissals = self.db.list_dismissals(user_id).unwrap_or_else(|e| {
            warn!(user_id, operation = "overview", error = %e, "Dismissal query failed, treating as none");
            Vec::new()
        });
        let income_sources = self.db.list_income_sources(user_id).unwrap_or_else(|e| {
            warn!(user_id, operation = "overview", error = %e, "Income source query failed, treating as none");
            Vec::new()
        });

        let cached = self.fresh_cache(user_id);
        let (ai_patterns, basic_extra): (&[DetectedPattern], &[DetectedPattern]) = match &cached {
            Some(c) if c.ai_powered => (&c.patterns, &[]),
            // A cached basic-detector fallback carries no model judgment
            Some(c) => (&[], &c.patterns),
            None => (&[], &[]),
        };

        let basic_live;
        let basic: &[DetectedPattern] = if !basic_extra.is_empty() {
            basic_extra
        } else {
            basic_live = detect_basic(&transactions, today);
            &basic_live
        };

        let items = reconcile(&ReconcileInputs {
            confirmed: &confirmed,
            dismissals: &dismissals,
            ai_patterns,
            basic_patterns: basic,
            income_sources: &income_sources,
            transactions: &transactions,
            today,
        });

        Ok(RecurringOverview {
            yearly_spend_estimate: yearly_spend_estimate(&items),
            pending_suggestion_count: self.db.count_pending_suggestions(user_id)?,
            ai_powered: cached.as_ref().map(|c| c.ai_powered).unwrap_or(false),
            last_analyzed_at: cached.map(|c| c.analyzed_at),
            items,
        })
    }

    /// The re-analyze operation: run (or reuse) the AI-assisted detection
    /// pass and return the reconciled result.
    ///
    /// Below the history gate this returns an explicit empty result rather
    /// than an error; a new user with three transactions is steady state,
    /// not a failure. A failing model degrades to the basic detector with a
    /// warning, and the degraded result is still cached.
    pub async fn reanalyze(
        &self,
        user_id: &str,
        force: bool,
        today: NaiveDate,
    ) -> Result<AnalysisOutcome> {
        let history = self.db.count_transactions(user_id)?;
        if history < self.config.min_history {
            info!(user_id, history, "Not enough history for analysis");
            return Ok(AnalysisOutcome {
                items: Vec::new(),
                yearly_spend_estimate: 0.0,
                pending_suggestion_count: self.db.count_pending_suggestions(user_id)?,
                ai_powered: false,
                last_analyzed_at: None,
                from_cache: false,
                enough_history: false,
            });
        }

        if !force {
            if let Some(cached) = self.fresh_cache(user_id) {
                debug!(user_id, "Serving analysis from cache");
                let overview = self.overview(user_id, today)?;
                return Ok(AnalysisOutcome {
                    items: overview.items,
                    yearly_spend_estimate: overview.yearly_spend_estimate,
                    pending_suggestion_count: overview.pending_suggestion_count,
                    ai_powered: cached.ai_powered,
                    last_analyzed_at: Some(cached.analyzed_at),
                    from_cache: true,
                    enough_history: true,
                });
            }
        }

        let transactions = self
            .db
            .list_transactions_since(user_id, self.window_start(today))?;

        let (patterns, ai_powered) = match self.ai {
            Some(ref ai) => match self.run_ai_analysis(ai, &transactions, today).await {
                Ok(patterns) => (patterns, true),
                Err(e) => {
                    warn!(user_id, operation = "reanalyze", error = %e, "AI analysis failed, falling back to basic detector");
                    (detect_basic(&transactions, today), false)
                }
            },
            None => (detect_basic(&transactions, today), false),
        };

        self.db.put_cached_analysis(user_id, &patterns, ai_powered)?;

        if ai_powered {
            self.record_suggestions(user_id, &patterns)?;
        }

        let overview = self.overview(user_id, today)?;
        Ok(AnalysisOutcome {
            items: overview.items,
            yearly_spend_estimate: overview.yearly_spend_estimate,
            pending_suggestion_count: overview.pending_suggestion_count,
            ai_powered,
            last_analyzed_at: overview.last_analyzed_at,
            from_cache: false,
            enough_history: true,
        })
    }

    /// Inspect a single merchant's transactions with the stricter analyzer
    /// thresholds. A read-only check: it never touches the cache or records
    /// suggestions, and unlike the batch detector it reports low-confidence
    /// patterns rather than suppressing them.
    pub fn analyze_merchant(
        &self,
        user_id: &str,
        merchant: &str,
        today: NaiveDate,
    ) -> Result<Option<DetectedPattern>> {
        let key = merchant_key(merchant, MATCH_KEY_TOKENS);
        if key.is_empty() {
            return Err(Error::InvalidInput(
                "Merchant name must not be empty".to_string(),
            ));
        }

        let transactions = self
            .db
            .list_transactions_since(user_id, self.window_start(today))?;
        let group: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.ignore_scope != IgnoreScope::All)
            .filter(|tx| keys_match_loose(&transaction_key(tx), &key))
            .collect();

        Ok(analyze_merchant_group(&group, today))
    }

    /// Run the model over per-merchant summaries and anchor its judgments
    /// back onto the actual transaction groups.
    async fn run_ai_analysis(
        &self,
        ai: &AIClient,
        transactions: &[Transaction],
        today: NaiveDate,
    ) -> Result<Vec<DetectedPattern>> {
        let mut groups: Vec<(String, Vec<&Transaction>, bool)> = Vec::new();
        for (direction, is_income) in [(Direction::Expense, false), (Direction::Income, true)] {
            for (key, txs) in group_candidates(transactions, direction, MIN_OCCURRENCES_AI) {
                groups.push((key, txs, is_income));
            }
        }

        let summaries: Vec<MerchantSummary> = groups
            .iter()
            .map(|(_, txs, is_income)| {
                let observations: Vec<(NaiveDate, f64)> =
                    txs.iter().map(|t| (t.date, t.amount)).collect();
                let latest = txs[txs.len() - 1];
                MerchantSummary::from_observations(
                    crate::normalize::best_descriptor(latest),
                    &observations,
                    latest.category.as_deref(),
                    *is_income,
                )
            })
            .collect();

        let judgments = ai.analyze_recurring(&summaries).await?;
        debug!(count = judgments.len(), "AI returned recurring judgments");

        let mut patterns = Vec::new();
        for judgment in judgments {
            let judged_key = merchant_key(&judgment.name, MATCH_KEY_TOKENS);
            // A judgment that doesn't anchor onto a real merchant group is a
            // hallucination and is dropped
            let Some((key, txs, group_income)) = groups
                .iter()
                .find(|(key, _, _)| keys_match_loose(key, &judged_key))
            else {
                warn!(name = %judgment.name, "AI pattern matches no merchant group, dropping");
                continue;
            };

            let observations: Vec<(NaiveDate, f64)> =
                txs.iter().map(|t| (t.date, t.amount)).collect();
            let Some(stats) = GroupStats::from_sorted(&observations) else {
                continue;
            };
            let latest = txs[txs.len() - 1];
            let is_income = judgment.is_income || *group_income;

            patterns.push(DetectedPattern {
                merchant_key: key.clone(),
                display_name: judgment.name.clone(),
                frequency: judgment.frequency,
                amount: stats.last_amount,
                average_amount: stats.avg_amount,
                is_income,
                next_expected_date: project_next(stats.last_date, judgment.frequency, None, today),
                last_seen_date: stats.last_date,
                category: latest.category.clone(),
                confidence: judgment.confidence,
                occurrences: stats.occurrences as i64,
                income_kind: is_income
                    .then(|| taxonomy::classify_income_kind(&judgment.name)),
                bill_type: judgment.bill_type.clone(),
                reason: judgment.reason.clone(),
            });
        }

        patterns.sort_by(|a, b| a.merchant_key.cmp(&b.merchant_key));
        Ok(patterns)
    }

    /// Surface AI-detected patterns as pending suggestions, skipping
    /// merchants already confirmed or dismissed.
    fn record_suggestions(&self, user_id: &str, patterns: &[DetectedPattern]) -> Result<()> {
        let dismissals = self.db.list_dismissals(user_id)?;

        for pattern in patterns {
            if self.db.get_pattern(user_id, &pattern.merchant_key)?.is_some() {
                continue;
            }
            if dismissals
                .iter()
                .any(|d| crate::normalize::dismissal_matches(&d.merchant_key, &pattern.merchant_key))
            {
                continue;
            }

            self.db.upsert_suggestion(
                user_id,
                &NewSuggestion {
                    merchant_key: pattern.merchant_key.clone(),
                    display_name: pattern.display_name.clone(),
                    frequency: pattern.frequency,
                    amount: pattern.amount,
                    average_amount: pattern.average_amount,
                    is_income: pattern.is_income,
                    next_expected_date: pattern.next_expected_date,
                    last_seen_date: Some(pattern.last_seen_date),
                    category: pattern.category.clone(),
                    confidence: pattern.confidence,
                    occurrences: pattern.occurrences,
                    bill_type: pattern.bill_type.clone(),
                    detection_reason: pattern.reason.clone().or_else(|| {
                        Some(format!(
                            "{} occurrences at a {} cadence",
                            pattern.occurrences, pattern.frequency
                        ))
                    }),
                },
            )?;
        }

        Ok(())
    }

    /// Apply a confirm or deny action to a batch of suggestion ids.
    ///
    /// Each item is applied independently; a failure on one is counted and
    /// logged without blocking the rest.
    pub fn apply_suggestions(
        &self,
        user_id: &str,
        ids: &[i64],
        action: SuggestionAction,
        today: NaiveDate,
    ) -> Result<BatchActionSummary> {
        let mut summary = BatchActionSummary::default();

        for &id in ids {
            let result = match action {
                SuggestionAction::Confirm => self.confirm_suggestion(user_id, id, today),
                SuggestionAction::Deny => self.deny_suggestion(user_id, id),
            };
            match result {
                Ok(()) => match action {
                    SuggestionAction::Confirm => summary.confirmed += 1,
                    SuggestionAction::Deny => summary.denied += 1,
                },
                Err(e) => {
                    warn!(user_id, suggestion_id = id, operation = "apply_suggestions", error = %e, "Suggestion action failed");
                    summary.failed += 1;
                }
            }
        }

        self.db.invalidate_analysis_cache(user_id)?;
        Ok(summary)
    }

    fn confirm_suggestion(&self, user_id: &str, id: i64, today: NaiveDate) -> Result<()> {
        let suggestion = self
            .db
            .get_suggestion(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("suggestion {}", id)))?;

        // Confirming beats any earlier dismissal of the same merchant
        self.db.remove_dismissal(user_id, &suggestion.merchant_key)?;

        self.db.upsert_pattern(
            user_id,
            &NewPattern {
                merchant_key: suggestion.merchant_key.clone(),
                display_name: suggestion.display_name.clone(),
                frequency: suggestion.frequency,
                amount: suggestion.amount,
                average_amount: suggestion.average_amount,
                is_income: suggestion.is_income,
                next_expected_date: suggestion.next_expected_date,
                last_seen_date: suggestion.last_seen_date,
                category: suggestion.category.clone(),
                confidence: suggestion.confidence,
                occurrences: suggestion.occurrences,
                bill_type: suggestion.bill_type.clone(),
                source: PatternSource::Ai,
            },
        )?;

        self.db
            .set_suggestion_status(user_id, id, SuggestionStatus::Confirmed)?;

        if suggestion.is_income {
            self.annotate_income_transactions(user_id, &suggestion.merchant_key, today)?;

            let kind = taxonomy::classify_income_kind(&suggestion.display_name);
            let pay_day = match suggestion.frequency {
                crate::models::Frequency::Monthly | crate::models::Frequency::SemiMonthly => {
                    suggestion.last_seen_date.map(|d| chrono::Datelike::day(&d))
                }
                _ => None,
            };
            self.db.upsert_income_source(
                user_id,
                &NewIncomeSource {
                    merchant_key: suggestion.merchant_key.clone(),
                    display_name: suggestion.display_name.clone(),
                    frequency: suggestion.frequency,
                    average_amount: suggestion.average_amount,
                    pay_day,
                    employer_name: (kind == crate::models::IncomeKind::Payroll)
                        .then(|| suggestion.display_name.clone()),
                    income_kind: kind,
                    confidence: suggestion.confidence,
                    first_seen_date: None,
                    last_seen_date: suggestion.last_seen_date,
                    total_received: suggestion.average_amount * suggestion.occurrences as f64,
                    occurrences: suggestion.occurrences,
                    is_verified: true,
                },
            )?;
        }

        info!(user_id, merchant_key = %suggestion.merchant_key, "Suggestion confirmed");
        Ok(())
    }

    fn deny_suggestion(&self, user_id: &str, id: i64) -> Result<()> {
        let suggestion = self
            .db
            .get_suggestion(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("suggestion {}", id)))?;

        let keywords = extract_keywords(&suggestion.display_name);
        self.db.upsert_dismissal(
            user_id,
            &suggestion.merchant_key,
            &suggestion.display_name,
            Some("user denied suggestion"),
            None,
            &keywords,
        )?;
        self.db
            .set_suggestion_status(user_id, id, SuggestionStatus::Denied)?;

        info!(user_id, merchant_key = %suggestion.merchant_key, "Suggestion denied");
        Ok(())
    }

    /// Mark window transactions that belong to a confirmed income pattern
    fn annotate_income_transactions(
        &self,
        user_id: &str,
        pattern_key: &str,
        today: NaiveDate,
    ) -> Result<()> {
        let transactions = self
            .db
            .list_transactions_since(user_id, self.window_start(today))?;

        let ids: Vec<i64> = transactions
            .iter()
            .filter(|tx| tx.amount < 0.0 && keys_match_loose(&transaction_key(tx), pattern_key))
            .map(|tx| tx.id)
            .collect();

        if !ids.is_empty() {
            let kind = taxonomy::classify_income_kind(pattern_key);
            let updated = self.db.annotate_income(&ids, kind)?;
            debug!(user_id, merchant_key = %pattern_key, updated, "Annotated income transactions");
        }
        Ok(())
    }

    /// Manually add a recurring pattern.
    ///
    /// Uses the longer income-style merchant key so a precise manual entry
    /// is not collapsed into an unrelated three-token key, and clears any
    /// standing dismissal: re-adding is an explicit reversal of "never show
    /// me this again".
    pub fn add_pattern(&self, user_id: &str, mut pattern: NewPattern) -> Result<RecurringPattern> {
        if pattern.display_name.trim().is_empty() {
            return Err(Error::InvalidInput("display_name must not be empty".into()));
        }
        if !pattern.amount.is_finite() || !pattern.average_amount.is_finite() {
            return Err(Error::InvalidInput("amount must be a finite number".into()));
        }

        if pattern.merchant_key.trim().is_empty() {
            pattern.merchant_key = merchant_key(&pattern.display_name, INCOME_KEY_TOKENS);
        }
        if pattern.merchant_key.is_empty() {
            return Err(Error::InvalidInput(format!(
                "display_name \"{}\" yields an empty merchant key",
                pattern.display_name
            )));
        }
        pattern.source = PatternSource::Manual;

        self.db.remove_dismissal(user_id, &pattern.merchant_key)?;
        self.db.upsert_pattern(user_id, &pattern)?;
        self.db.invalidate_analysis_cache(user_id)?;

        info!(user_id, merchant_key = %pattern.merchant_key, "Pattern added manually");
        self.db
            .get_pattern(user_id, &pattern.merchant_key)?
            .ok_or_else(|| Error::NotFound(format!("pattern {}", pattern.merchant_key)))
    }

    /// Edit an existing pattern by merchant key
    pub fn edit_pattern(
        &self,
        user_id: &str,
        merchant_key: &str,
        mut pattern: NewPattern,
    ) -> Result<RecurringPattern> {
        let existing = self
            .db
            .get_pattern(user_id, merchant_key)?
            .ok_or_else(|| Error::NotFound(format!("pattern {}", merchant_key)))?;

        if pattern.display_name.trim().is_empty() {
            return Err(Error::InvalidInput("display_name must not be empty".into()));
        }

        pattern.merchant_key = existing.merchant_key.clone();
        pattern.source = existing.source;
        self.db.upsert_pattern(user_id, &pattern)?;
        self.db.invalidate_analysis_cache(user_id)?;

        self.db
            .get_pattern(user_id, merchant_key)?
            .ok_or_else(|| Error::NotFound(format!("pattern {}", merchant_key)))
    }

    /// Delete a pattern by merchant key
    pub fn delete_pattern(&self, user_id: &str, merchant_key: &str) -> Result<()> {
        if !self.db.delete_pattern(user_id, merchant_key)? {
            return Err(Error::NotFound(format!("pattern {}", merchant_key)));
        }
        self.db.invalidate_analysis_cache(user_id)?;
        info!(user_id, merchant_key, "Pattern deleted");
        Ok(())
    }

    /// Accept a batch from the bank-sync feed and invalidate the cache:
    /// new transactions can change every downstream result.
    pub fn ingest_transactions(&self, user_id: &str, txs: &[NewTransaction]) -> Result<usize> {
        let inserted = self.db.insert_transactions(user_id, txs)?;
        self.db.invalidate_analysis_cache(user_id)?;
        info!(user_id, inserted, "Ingested transactions");
        Ok(inserted)
    }
}
