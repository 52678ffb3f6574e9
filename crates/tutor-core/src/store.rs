//! Course collection and local persistence.
//!
//! [`CourseStore`] owns the ordered list of courses and the theme
//! preference. Every mutation bumps a version counter; persistence is an
//! explicit [`CourseStore::save`] after the mutation, never implicit.
//! [`CourseStore::update_courses`] pairs the two and undoes a change whose
//! save failed.
//!
//! Two files live in the data directory:
//!
//! - `ai-tutor-courses.json` holds the full course list as JSON
//! - `ai-tutor-theme` holds the literal text `dark` or `light`

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::course::{Course, Module, Theme};
use crate::error::{Result, TutorError};
use crate::lesson::FinalizedLesson;
use crate::quiz::QuizResult;

/// File name of the persisted course list.
pub const COURSES_FILE: &str = "ai-tutor-courses.json";

/// File name of the persisted theme preference.
pub const THEME_FILE: &str = "ai-tutor-theme";

/// Ordered, versioned course collection backed by a data directory.
#[derive(Debug, Clone)]
pub struct CourseStore {
    dir: PathBuf,
    courses: Vec<Course>,
    theme: Theme,
    version: u64,
}

impl CourseStore {
    /// Creates an empty store rooted at `dir` without touching the disk.
    #[must_use]
    pub fn empty(dir: impl Into<PathBuf>, theme: Theme) -> Self {
        Self {
            dir: dir.into(),
            courses: Vec::new(),
            theme,
            version: 0,
        }
    }

    /// Reads both files from `dir`.
    ///
    /// A missing courses file means no courses; a missing or unrecognised
    /// theme file means `default_theme`.
    ///
    /// # Errors
    ///
    /// Returns `StoreCorrupted` if the courses file is not valid JSON, or
    /// `Io` if a file exists but cannot be read.
    pub async fn load(dir: impl Into<PathBuf>, default_theme: Theme) -> Result<Self> {
        let dir = dir.into();

        let courses_path = dir.join(COURSES_FILE);
        let courses = match read_optional(&courses_path).await? {
            Some(contents) => serde_json::from_str::<Vec<Course>>(&contents)
                .map_err(|e| TutorError::store_corrupted(&courses_path, e.to_string()))?,
            None => Vec::new(),
        };

        let theme = match read_optional(&dir.join(THEME_FILE)).await? {
            Some(contents) => contents.parse::<Theme>().unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring stored theme");
                default_theme
            }),
            None => default_theme,
        };

        debug!(dir = %dir.display(), courses = courses.len(), %theme, "Loaded course store");
        Ok(Self {
            dir,
            courses,
            theme,
            version: 0,
        })
    }

    /// Writes both files in full.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory or a file cannot be written.
    pub async fn save(&self) -> Result<()> {
        self.save_courses().await?;
        self.save_theme().await
    }

    /// Rewrites the courses file.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` if the file cannot be written.
    pub async fn save_courses(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.courses)?;
        write_replace(&self.dir, COURSES_FILE, json.as_bytes()).await?;
        debug!(courses = self.courses.len(), version = self.version, "Saved courses");
        Ok(())
    }

    /// Rewrites the theme file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub async fn save_theme(&self) -> Result<()> {
        write_replace(&self.dir, THEME_FILE, self.theme.as_str().as_bytes()).await
    }

    /// Applies `mutate` and saves the courses file, restoring the previous
    /// courses if the save fails.
    ///
    /// Nothing is written when `mutate` leaves the version unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error from `mutate`, or the save error after rolling back.
    pub async fn update_courses<T>(
        &mut self,
        mutate: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let courses = self.courses.clone();
        let version = self.version;

        let value = mutate(self)?;
        if self.version == version {
            return Ok(value);
        }

        if let Err(e) = self.save_courses().await {
            warn!(error = %e, "Save failed; discarding unsaved course changes");
            self.courses = courses;
            self.version = version;
            return Err(e);
        }
        Ok(value)
    }

    /// Sets and saves the theme, keeping the old theme if the save fails.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub async fn update_theme(&mut self, theme: Theme) -> Result<()> {
        let previous = self.theme;
        let version = self.version;
        self.set_theme(theme);
        if let Err(e) = self.save_theme().await {
            self.theme = previous;
            self.version = version;
            return Err(e);
        }
        Ok(())
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All courses, in creation order.
    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// The theme preference.
    #[must_use]
    pub const fn theme(&self) -> Theme {
        self.theme
    }

    /// Mutation counter; increases on every change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Looks up a course by id.
    #[must_use]
    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == course_id)
    }

    /// Looks up a course by id, failing with `CourseNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` if no course has this id.
    pub fn get(&self, course_id: &str) -> Result<&Course> {
        self.course(course_id)
            .ok_or_else(|| TutorError::course_not_found(course_id))
    }

    /// Resolves a course by id or by 1-based position in the list.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` if the selector matches nothing.
    pub fn resolve(&self, selector: &str) -> Result<&Course> {
        if let Some(course) = self.course(selector) {
            return Ok(course);
        }
        selector
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.courses.get(idx))
            .ok_or_else(|| TutorError::course_not_found(selector))
    }

    /// Appends a newly created course.
    pub fn add_course(&mut self, course: Course) {
        info!(course_id = %course.id, title = %course.title, "Adding course");
        self.courses.push(course);
        self.version += 1;
    }

    /// Removes a course and returns it.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` if no course has this id.
    pub fn delete_course(&mut self, course_id: &str) -> Result<Course> {
        let idx = self
            .courses
            .iter()
            .position(|c| c.id == course_id)
            .ok_or_else(|| TutorError::course_not_found(course_id))?;
        let course = self.courses.remove(idx);
        self.version += 1;
        info!(course_id = %course.id, "Deleted course");
        Ok(course)
    }

    /// Caches a finished lesson and its quiz on a module.
    ///
    /// Returns `false` without changing anything if the module already has a
    /// lesson; content and quiz are set together exactly once.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` or `ModuleNotFound`.
    pub fn attach_module_result(
        &mut self,
        course_id: &str,
        module_id: &str,
        lesson: &FinalizedLesson,
    ) -> Result<bool> {
        let module = self.module_mut(course_id, module_id)?;
        if module.has_lesson() {
            return Ok(false);
        }
        module.content = Some(lesson.lesson.clone());
        module.quiz = Some(lesson.quiz.clone());
        self.version += 1;
        Ok(true)
    }

    /// Records a quiz score on a module and returns the updated module.
    ///
    /// The score is always replaced. Completion only ever moves from not
    /// completed to completed.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` or `ModuleNotFound`.
    pub fn record_quiz_score(
        &mut self,
        course_id: &str,
        module_id: &str,
        result: &QuizResult,
    ) -> Result<Module> {
        let module = self.module_mut(course_id, module_id)?;
        module.quiz_score = Some(result.percent);
        module.is_completed = Some(module.completed() || result.passed);
        let updated = module.clone();
        self.version += 1;
        Ok(updated)
    }

    /// Sets the theme preference.
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.version += 1;
    }

    fn module_mut(&mut self, course_id: &str, module_id: &str) -> Result<&mut Module> {
        self.courses
            .iter_mut()
            .find(|c| c.id == course_id)
            .ok_or_else(|| TutorError::course_not_found(course_id))?
            .module_mut(module_id)
            .ok_or_else(|| TutorError::module_not_found(course_id, module_id))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `name` inside `dir` through a temporary file so readers never see
/// a partial document.
async fn write_replace(dir: &Path, name: &str, contents: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join(format!(".{name}.tmp"));
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, dir.join(name)).await?;
    Ok(())
}
