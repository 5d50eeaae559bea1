//! `job_postings` table: the canonical posting store.

use pomona_core::error::AppError;
use pomona_core::models::EnrichedJob;
use pomona_core::traits::PostingStore;

use crate::store::PgStore;

impl PostingStore for PgStore {
    /// Upserts the batch in one transaction.
    ///
    /// `xmax = 0` holds only for rows created by this statement, which is how
    /// inserts are told apart from updates without a second query.
    async fn upsert_postings(&self, jobs: &[EnrichedJob]) -> Result<usize, AppError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let mut inserted = 0usize;

        for item in jobs {
            let job = &item.job;
            let enrichment = &item.enrichment;

            let (was_inserted,): (bool,) = sqlx::query_as(
                r#"
                INSERT INTO job_postings (
                    source_slug, external_id, title, company, location,
                    employment_type, remote_type, posted_date, external_url,
                    salary_min, salary_max, description, raw,
                    seniority, experience_min_years, experience_max_years,
                    required_skills, preferred_skills, education_level, industry,
                    trust_level, first_seen_at, last_seen_at
                )
                VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, NOW(), NOW()
                )
                ON CONFLICT (source_slug, external_id)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    company = EXCLUDED.company,
                    location = EXCLUDED.location,
                    employment_type = EXCLUDED.employment_type,
                    remote_type = EXCLUDED.remote_type,
                    posted_date = EXCLUDED.posted_date,
                    external_url = EXCLUDED.external_url,
                    salary_min = EXCLUDED.salary_min,
                    salary_max = EXCLUDED.salary_max,
                    description = EXCLUDED.description,
                    raw = EXCLUDED.raw,
                    seniority = EXCLUDED.seniority,
                    experience_min_years = EXCLUDED.experience_min_years,
                    experience_max_years = EXCLUDED.experience_max_years,
                    required_skills = EXCLUDED.required_skills,
                    preferred_skills = EXCLUDED.preferred_skills,
                    education_level = EXCLUDED.education_level,
                    industry = EXCLUDED.industry,
                    trust_level = EXCLUDED.trust_level,
                    last_seen_at = NOW()
                RETURNING (xmax = 0)
                "#,
            )
            .bind(&job.source_slug)
            .bind(&job.external_id)
            .bind(&job.title)
            .bind(&job.company)
            .bind(&job.location)
            .bind(&job.employment_type)
            .bind(&job.remote_type)
            .bind(&job.posted_date)
            .bind(&job.external_url)
            .bind(job.salary_min)
            .bind(job.salary_max)
            .bind(&job.description)
            .bind(&job.raw)
            .bind(enrichment.seniority.map(|s| s.as_str()))
            .bind(enrichment.experience_min_years.map(|y| y as i32))
            .bind(enrichment.experience_max_years.map(|y| y as i32))
            .bind(&enrichment.required_skills)
            .bind(&enrichment.preferred_skills)
            .bind(enrichment.education_level.map(|e| e.as_str()))
            .bind(&enrichment.industry)
            .bind(item.trust_level.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

            if was_inserted {
                inserted += 1;
            }
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;

        tracing::debug!(batch = jobs.len(), inserted, "Upserted postings");
        Ok(inserted)
    }
}
