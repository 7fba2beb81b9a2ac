use rusqlite::params;
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::{Citation, Claim, ClaimEvidence};

impl Db {
    pub async fn insert_citation(
        &self,
        message_id: String,
        source_id: String,
        chunk_id: Option<String>,
        quote: String,
        char_start: Option<i64>,
        char_end: Option<i64>,
        rank_score: Option<f64>,
    ) -> Result<Citation, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO citations (id, message_id, source_id, chunk_id, quote, char_start, char_end, rank_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![id, message_id, source_id, chunk_id, quote, char_start, char_end, rank_score],
            )?;
            Ok(Citation {
                id,
                message_id,
                source_id,
                chunk_id,
                quote,
                char_start,
                char_end,
                rank_score,
            })
        })
        .await
    }

    pub async fn list_citations_by_message(
        &self,
        message_id: String,
    ) -> Result<Vec<Citation>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, source_id, chunk_id, quote, char_start, char_end, rank_score
                 FROM citations WHERE message_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![message_id], |row| {
                    Ok(Citation {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        source_id: row.get(2)?,
                        chunk_id: row.get(3)?,
                        quote: row.get(4)?,
                        char_start: row.get(5)?,
                        char_end: row.get(6)?,
                        rank_score: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Inserts a claim with its support score clamped to `[0, 1]`.
    pub async fn insert_claim(
        &self,
        message_id: String,
        text: String,
        claim_type: Option<String>,
        support_score: f64,
        contradicted: bool,
        uncertainty_reason: Option<String>,
    ) -> Result<Claim, AppError> {
        let support_score = support_score.clamp(0.0, 1.0);
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO claims (id, message_id, text, claim_type, support_score, contradicted, uncertainty_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, message_id, text, claim_type, support_score, contradicted as i64, uncertainty_reason],
            )?;
            Ok(Claim {
                id,
                message_id,
                text,
                claim_type,
                support_score,
                contradicted,
                uncertainty_reason,
            })
        })
        .await
    }

    pub async fn update_claim_contradiction(
        &self,
        claim_id: String,
        contradicted: bool,
        new_support_score: f64,
        uncertainty_reason: Option<String>,
    ) -> Result<(), AppError> {
        let new_support_score = new_support_score.clamp(0.0, 1.0);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE claims SET contradicted = ?1, support_score = ?2,
                    uncertainty_reason = COALESCE(uncertainty_reason, ?3)
                 WHERE id = ?4",
                params![contradicted as i64, new_support_score, uncertainty_reason, claim_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_claims_by_message(&self, message_id: String) -> Result<Vec<Claim>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, text, claim_type, support_score, contradicted, uncertainty_reason
                 FROM claims WHERE message_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![message_id], |row| {
                    Ok(Claim {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        text: row.get(2)?,
                        claim_type: row.get(3)?,
                        support_score: row.get(4)?,
                        contradicted: row.get::<_, i64>(5)? != 0,
                        uncertainty_reason: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Inserts evidence for a claim. `char_start`/`char_end` index into
    /// `Chunk.text` relative to the chunk.
    pub async fn insert_claim_evidence(
        &self,
        claim_id: String,
        source_id: String,
        chunk_id: String,
        quote: String,
        char_start: i64,
        char_end: i64,
        score: Option<f64>,
    ) -> Result<ClaimEvidence, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO claim_evidence (id, claim_id, source_id, chunk_id, quote, char_start, char_end, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![id, claim_id, source_id, chunk_id, quote, char_start, char_end, score],
            )?;
            Ok(ClaimEvidence {
                id,
                claim_id,
                source_id,
                chunk_id,
                quote,
                char_start,
                char_end,
                score,
            })
        })
        .await
    }

    pub async fn list_evidence_by_claim(
        &self,
        claim_id: String,
    ) -> Result<Vec<ClaimEvidence>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, claim_id, source_id, chunk_id, quote, char_start, char_end, score
                 FROM claim_evidence WHERE claim_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![claim_id], |row| {
                    Ok(ClaimEvidence {
                        id: row.get(0)?,
                        claim_id: row.get(1)?,
                        source_id: row.get(2)?,
                        chunk_id: row.get(3)?,
                        quote: row.get(4)?,
                        char_start: row.get(5)?,
                        char_end: row.get(6)?,
                        score: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
