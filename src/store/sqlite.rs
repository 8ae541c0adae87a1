use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use log::debug;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{
    CodeRecord, NewReview, ReviewDetails, ReviewRecord, ReviewStatus, ReviewStore,
    ReviewSummary, StatusUpdate, StoreError, StoredAnalysis, StoredIssue, StoredMetrics,
    MAX_STORED_ISSUES, MAX_TITLE_CHARS,
};
use crate::analysis::{AnalysisReport, Issue, MetricsBlock};
use crate::utils::truncate_chars;

const REVIEW_COLUMNS: &str = "r.id, r.user_id, r.title, r.description, r.language, r.review_type, \
     r.status, r.score, r.lines_of_code, r.issues, r.suggestions, r.improvement_rate, \
     r.error_message, r.github_repo, r.github_path, r.created_at, r.completed_at";

/// SQLite-backed [`ReviewStore`].
///
/// The connection sits behind a mutex so the store can be shared across the
/// request handlers and background analysis threads.
pub struct SqliteReviewStore {
    conn: Mutex<Connection>,
}

impl SqliteReviewStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // journal_mode reports the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic; a poisoned lock still guards a consistent connection.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
          id TEXT PRIMARY KEY,
          user_id TEXT NOT NULL,
          title TEXT NOT NULL,
          description TEXT NOT NULL DEFAULT '',
          language TEXT NOT NULL,
          review_type TEXT NOT NULL,
          status TEXT NOT NULL,
          score REAL,
          lines_of_code INTEGER,
          issues INTEGER,
          suggestions INTEGER,
          improvement_rate REAL,
          error_message TEXT,
          github_repo TEXT,
          github_path TEXT,
          created_at TEXT NOT NULL,
          completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id, created_at);

        CREATE TABLE IF NOT EXISTS code_reviews (
          id TEXT PRIMARY KEY,
          review_id TEXT NOT NULL,
          user_id TEXT NOT NULL,
          language TEXT NOT NULL,
          code TEXT NOT NULL,
          results TEXT,
          created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_code_reviews_review ON code_reviews(review_id);

        CREATE TABLE IF NOT EXISTS ai_analysis (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          review_id TEXT NOT NULL,
          summary TEXT NOT NULL,
          strengths TEXT NOT NULL,
          improvements TEXT NOT NULL,
          categories TEXT NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS review_metrics (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          review_id TEXT NOT NULL,
          score REAL NOT NULL,
          complexity REAL NOT NULL,
          maintainability_index REAL NOT NULL,
          cyclomatic_complexity REAL NOT NULL,
          cognitive_complexity REAL NOT NULL,
          duplicated_lines INTEGER NOT NULL,
          test_coverage REAL NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS review_issues (
          review_id TEXT NOT NULL,
          id INTEGER NOT NULL,
          type TEXT NOT NULL,
          severity TEXT NOT NULL,
          line INTEGER NOT NULL,
          column_number INTEGER NOT NULL,
          title TEXT NOT NULL,
          message TEXT NOT NULL,
          suggestion TEXT NOT NULL,
          code_snippet TEXT NOT NULL,
          fixed_code TEXT NOT NULL,
          created_at TEXT NOT NULL,
          PRIMARY KEY (review_id, id)
        );
        "#,
    )?;
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ToSql for ReviewStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReviewStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    Ok(ReviewRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        language: row.get("language")?,
        review_type: row.get("review_type")?,
        status: row.get("status")?,
        score: row.get("score")?,
        lines_of_code: row.get("lines_of_code")?,
        issues: row.get("issues")?,
        suggestions: row.get("suggestions")?,
        improvement_rate: row.get("improvement_rate")?,
        error_message: row.get("error_message")?,
        github_repo: row.get("github_repo")?,
        github_path: row.get("github_path")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    })
}

fn load_review(
    conn: &Connection,
    id: &str,
    user_id: &str,
) -> Result<Option<ReviewRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM reviews r WHERE r.id = ?1 AND r.user_id = ?2",
                REVIEW_COLUMNS
            ),
            params![id, user_id],
            review_from_row,
        )
        .optional()?)
}

fn load_code(conn: &Connection, sql: &str, args: &[&str]) -> Result<Option<CodeRecord>, StoreError> {
    let row = conn
        .query_row(sql, rusqlite::params_from_iter(args), |row| {
            Ok((
                row.get::<_, String>("id")?,
                row.get::<_, String>("review_id")?,
                row.get::<_, String>("user_id")?,
                row.get::<_, String>("language")?,
                row.get::<_, String>("code")?,
                row.get::<_, Option<String>>("results")?,
                row.get::<_, String>("created_at")?,
            ))
        })
        .optional()?;

    row.map(|(id, review_id, user_id, language, code, results, created_at)| {
        Ok::<_, StoreError>(CodeRecord {
            id,
            review_id,
            user_id,
            language,
            code,
            results: results.map(|r| serde_json::from_str(&r)).transpose()?,
            created_at,
        })
    })
    .transpose()
}

fn load_analysis(conn: &Connection, review_id: &str) -> Result<Option<StoredAnalysis>, StoreError> {
    let row = conn
        .query_row(
            "SELECT summary, strengths, improvements, categories, created_at
             FROM ai_analysis WHERE review_id = ?1 ORDER BY id DESC LIMIT 1",
            params![review_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(summary, strengths, improvements, categories, created_at)| {
        Ok::<_, StoreError>(StoredAnalysis {
            review_id: review_id.to_string(),
            summary,
            strengths: serde_json::from_str(&strengths)?,
            improvements: serde_json::from_str(&improvements)?,
            categories: serde_json::from_str(&categories)?,
            created_at,
        })
    })
    .transpose()
}

fn load_metrics(conn: &Connection, review_id: &str) -> Result<Option<StoredMetrics>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT score, complexity, maintainability_index, cyclomatic_complexity,
                    cognitive_complexity, duplicated_lines, test_coverage, created_at
             FROM review_metrics WHERE review_id = ?1 ORDER BY id DESC LIMIT 1",
            params![review_id],
            |row| {
                Ok(StoredMetrics {
                    review_id: review_id.to_string(),
                    score: row.get(0)?,
                    complexity: row.get(1)?,
                    maintainability_index: row.get(2)?,
                    cyclomatic_complexity: row.get(3)?,
                    cognitive_complexity: row.get(4)?,
                    duplicated_lines: row.get(5)?,
                    test_coverage: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
        .optional()?)
}

fn load_issues(conn: &Connection, review_id: &str) -> Result<Vec<StoredIssue>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, type, severity, line, column_number, title, message, suggestion,
                code_snippet, fixed_code, created_at
         FROM review_issues WHERE review_id = ?1
         ORDER BY CASE severity WHEN 'high' THEN 0 WHEN 'medium' THEN 1 WHEN 'low' THEN 2 ELSE 3 END, id",
    )?;
    let issues = stmt
        .query_map(params![review_id], |row| {
            Ok(StoredIssue {
                id: row.get(0)?,
                review_id: review_id.to_string(),
                kind: row.get(1)?,
                severity: row.get(2)?,
                line: row.get(3)?,
                column_number: row.get(4)?,
                title: row.get(5)?,
                message: row.get(6)?,
                suggestion: row.get(7)?,
                code_snippet: row.get(8)?,
                fixed_code: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(issues)
}

impl ReviewStore for SqliteReviewStore {
    fn create_review(&self, review: &NewReview) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO reviews (id, user_id, title, description, language, review_type,
                                  status, github_repo, github_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                review.user_id,
                review.title,
                review.description,
                review.language,
                review.review_type,
                ReviewStatus::Pending,
                review.github_repo,
                review.github_path,
                now(),
            ],
        )?;
        debug!("Created review {}", id);
        Ok(id)
    }

    fn store_code(
        &self,
        review_id: &str,
        user_id: &str,
        language: &str,
        code: &str,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO code_reviews (id, review_id, user_id, language, code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, review_id, user_id, language, code, now()],
        )?;
        Ok(id)
    }

    fn store_analysis(&self, review_id: &str, report: &AnalysisReport) -> Result<(), StoreError> {
        let analysis = &report.analysis;
        self.conn().execute(
            "INSERT INTO ai_analysis (review_id, summary, strengths, improvements, categories, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                review_id,
                analysis.summary,
                serde_json::to_string(&analysis.strengths)?,
                serde_json::to_string(&analysis.improvements)?,
                serde_json::to_string(&analysis.categories)?,
                now(),
            ],
        )?;
        debug!(
            "Stored analysis for review {}: {} strengths, {} improvements",
            review_id,
            analysis.strengths.len(),
            analysis.improvements.len()
        );
        Ok(())
    }

    fn store_metrics(&self, review_id: &str, metrics: &MetricsBlock) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO review_metrics (review_id, score, complexity, maintainability_index,
                                         cyclomatic_complexity, cognitive_complexity,
                                         duplicated_lines, test_coverage, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                review_id,
                metrics.score,
                metrics.complexity,
                metrics.maintainability_index,
                f64::from(metrics.cyclomatic_complexity),
                f64::from(metrics.cognitive_complexity),
                i64::from(metrics.duplicated_lines),
                metrics.test_coverage,
                now(),
            ],
        )?;
        Ok(())
    }

    fn store_issues(&self, review_id: &str, issues: &[Issue]) -> Result<(), StoreError> {
        if issues.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created_at = now();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO review_issues
                   (review_id, id, type, severity, line, column_number, title, message,
                    suggestion, code_snippet, fixed_code, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for (idx, issue) in issues.iter().take(MAX_STORED_ISSUES).enumerate() {
                stmt.execute(params![
                    review_id,
                    idx as i64 + 1,
                    issue.kind,
                    issue.severity.as_str(),
                    i64::from(issue.line),
                    i64::from(issue.column),
                    truncate_chars(&issue.title, MAX_TITLE_CHARS),
                    issue.message,
                    issue.suggestion,
                    issue.code_snippet,
                    issue.fixed_code,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            "Stored {} issues for review {}",
            issues.len().min(MAX_STORED_ISSUES),
            review_id
        );
        Ok(())
    }

    fn store_results(&self, review_id: &str, report: &AnalysisReport) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE code_reviews SET results = ?1 WHERE review_id = ?2",
            params![serde_json::to_string(report)?, review_id],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownReview(review_id.to_string()));
        }
        Ok(())
    }

    fn update_status(&self, review_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let completed_at = (update.status == ReviewStatus::Completed).then(now);
        let updated = self.conn().execute(
            "UPDATE reviews SET
               status = ?1,
               completed_at = ?2,
               score = COALESCE(?3, score),
               lines_of_code = COALESCE(?4, lines_of_code),
               issues = COALESCE(?5, issues),
               suggestions = COALESCE(?6, suggestions),
               improvement_rate = COALESCE(?7, improvement_rate),
               error_message = COALESCE(?8, error_message)
             WHERE id = ?9",
            params![
                update.status,
                completed_at,
                update.score,
                update.lines_of_code.map(|n| n as i64),
                update.issues_count.map(|n| n as i64),
                update.suggestions_count.map(|n| n as i64),
                update.improvement_rate,
                update.error_message,
                review_id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownReview(review_id.to_string()));
        }
        Ok(())
    }

    fn find_review(&self, id: &str, user_id: &str) -> Result<Option<ReviewDetails>, StoreError> {
        let conn = self.conn();

        let (review, code_data) = match load_review(&conn, id, user_id)? {
            Some(review) => {
                let code = load_code(
                    &conn,
                    "SELECT * FROM code_reviews WHERE review_id = ?1 LIMIT 1",
                    &[review.id.as_str()],
                )?;
                (review, code)
            }
            None => {
                // The submission response hands out the code-review id
                let Some(code) = load_code(
                    &conn,
                    "SELECT * FROM code_reviews WHERE id = ?1 AND user_id = ?2",
                    &[id, user_id],
                )?
                else {
                    return Ok(None);
                };
                match load_review(&conn, &code.review_id, user_id)? {
                    Some(review) => (review, Some(code)),
                    None => return Ok(None),
                }
            }
        };

        let ai_analysis = load_analysis(&conn, &review.id)?;
        let metrics = load_metrics(&conn, &review.id)?;
        let detailed_issues = load_issues(&conn, &review.id)?;

        Ok(Some(ReviewDetails {
            review,
            code_data,
            ai_analysis,
            metrics,
            detailed_issues,
        }))
    }

    fn list_reviews(&self, user_id: &str) -> Result<Vec<ReviewSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, c.code AS code FROM reviews r
             JOIN code_reviews c ON c.review_id = r.id
             WHERE r.user_id = ?1
             ORDER BY r.created_at DESC, r.rowid DESC",
            REVIEW_COLUMNS
        ))?;
        let reviews = stmt
            .query_map(params![user_id], |row| {
                Ok(ReviewSummary {
                    review: review_from_row(row)?,
                    code: row.get("code")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::normalize;

    fn new_review(user: &str, language: &str) -> NewReview {
        NewReview {
            user_id: user.to_string(),
            title: "Sample".to_string(),
            description: String::new(),
            language: language.to_string(),
            review_type: "general".to_string(),
            github_repo: None,
            github_path: None,
        }
    }

    fn sample_report() -> AnalysisReport {
        normalize(
            r#"{"analysis": {"summary": "ok", "strengths": ["clear"]},
                "metrics": {"score": 77, "cyclomatic_complexity": 4},
                "issues": [
                  {"severity": "low", "title": "Low one", "column": 3},
                  {"severity": "high", "title": "High one"},
                  {"severity": "medium", "title": "Medium one"}
                ]}"#,
            "print(1)",
        )
    }

    #[test]
    fn create_and_find_by_either_id() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let review_id = store.create_review(&new_review("u1", "python")).unwrap();
        let code_id = store.store_code(&review_id, "u1", "python", "print(1)").unwrap();

        let by_review = store.find_review(&review_id, "u1").unwrap().unwrap();
        assert_eq!(by_review.review.status, ReviewStatus::Pending);
        assert_eq!(by_review.code_data.unwrap().id, code_id);

        let by_code = store.find_review(&code_id, "u1").unwrap().unwrap();
        assert_eq!(by_code.review.id, review_id);
    }

    #[test]
    fn find_is_scoped_to_user() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let review_id = store.create_review(&new_review("u1", "python")).unwrap();
        let code_id = store.store_code(&review_id, "u1", "python", "x").unwrap();

        assert!(store.find_review(&review_id, "u2").unwrap().is_none());
        assert!(store.find_review(&code_id, "u2").unwrap().is_none());
        assert!(store.find_review("missing", "u1").unwrap().is_none());
    }

    #[test]
    fn stores_and_joins_analysis_parts() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let review_id = store.create_review(&new_review("u1", "python")).unwrap();
        store.store_code(&review_id, "u1", "python", "print(1)").unwrap();
        let report = sample_report();

        store.store_analysis(&review_id, &report).unwrap();
        store.store_metrics(&review_id, &report.metrics).unwrap();
        store.store_issues(&review_id, &report.issues).unwrap();
        store.store_results(&review_id, &report).unwrap();

        let details = store.find_review(&review_id, "u1").unwrap().unwrap();
        let analysis = details.ai_analysis.unwrap();
        assert_eq!(analysis.summary, "ok");
        assert_eq!(analysis.strengths, vec!["clear".to_string()]);
        assert_eq!(analysis.categories["security"]["score"], 6);

        let metrics = details.metrics.unwrap();
        assert_eq!(metrics.score, 77.0);
        assert_eq!(metrics.cyclomatic_complexity, 4.0);

        let titles: Vec<_> = details
            .detailed_issues
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["High one", "Medium one", "Low one"]);
        assert_eq!(details.detailed_issues[2].column_number, 3);

        let results = details.code_data.unwrap().results.unwrap();
        assert_eq!(results["issues"][0]["column_number"], 3);
    }

    #[test]
    fn caps_issues_and_truncates_titles() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let review_id = store.create_review(&new_review("u1", "rust")).unwrap();
        let mut report = sample_report();
        let template = report.issues[0].clone();
        report.issues = (1..=25)
            .map(|id| Issue {
                id,
                title: "x".repeat(300),
                ..template.clone()
            })
            .collect();

        store.store_issues(&review_id, &report.issues).unwrap();

        let details = store.find_review(&review_id, "u1").unwrap().unwrap();
        assert_eq!(details.detailed_issues.len(), MAX_STORED_ISSUES);
        assert_eq!(details.detailed_issues[0].title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn update_status_sets_completion_fields() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let review_id = store.create_review(&new_review("u1", "go")).unwrap();

        store
            .update_status(
                &review_id,
                &StatusUpdate::new(ReviewStatus::InProgress).with_lines_of_code(12),
            )
            .unwrap();
        let update = StatusUpdate {
            score: Some(81.0),
            issues_count: Some(2),
            ..StatusUpdate::new(ReviewStatus::Completed)
        };
        store.update_status(&review_id, &update).unwrap();

        let review = store.find_review(&review_id, "u1").unwrap().unwrap().review;
        assert_eq!(review.status, ReviewStatus::Completed);
        assert_eq!(review.lines_of_code, Some(12));
        assert_eq!(review.score, Some(81.0));
        assert_eq!(review.issues, Some(2));
        assert!(review.completed_at.is_some());
    }

    #[test]
    fn update_unknown_review_fails() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let result = store.update_status("nope", &StatusUpdate::failed("x"));
        assert!(matches!(result, Err(StoreError::UnknownReview(_))));
        let result = store.store_results("nope", &sample_report());
        assert!(matches!(result, Err(StoreError::UnknownReview(_))));
    }

    #[test]
    fn list_reviews_newest_first_with_code() {
        let store = SqliteReviewStore::open_in_memory().unwrap();
        let first = store.create_review(&new_review("u1", "python")).unwrap();
        store.store_code(&first, "u1", "python", "a").unwrap();
        let second = store.create_review(&new_review("u1", "rust")).unwrap();
        store.store_code(&second, "u1", "rust", "b").unwrap();
        // No code row: excluded
        store.create_review(&new_review("u1", "go")).unwrap();
        let other = store.create_review(&new_review("u2", "python")).unwrap();
        store.store_code(&other, "u2", "python", "c").unwrap();

        let reviews = store.list_reviews("u1").unwrap();
        let ids: Vec<_> = reviews.iter().map(|r| r.review.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(reviews[0].code, "b");
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reviews.db");
        let store = SqliteReviewStore::open(&path).unwrap();
        store.create_review(&new_review("u1", "python")).unwrap();
        assert!(path.exists());
    }
}
