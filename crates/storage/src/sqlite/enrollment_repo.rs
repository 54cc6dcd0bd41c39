use quiz_core::model::{CourseId, EnrollmentId, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_enrollment_row, write_err};
use crate::repository::{Enrollment, EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (id, student_id, course_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                student_id = excluded.student_id,
                course_id = excluded.course_id
            ",
        )
        .bind(id_i64("enrollment_id", enrollment.id.value())?)
        .bind(id_i64("student_id", enrollment.student_id.value())?)
        .bind(id_i64("course_id", enrollment.course_id.value())?)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query("SELECT id, student_id, course_id FROM enrollments WHERE id = ?1")
            .bind(id_i64("enrollment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn resolve_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, student_id, course_id
            FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }
}
