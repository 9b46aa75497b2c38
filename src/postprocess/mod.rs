//! Postprocessing - normalization passes run to a fixed point.
//!
//! Each [`Postprocessor`] takes the statement by value and hands it back as
//! [`Transformed::Yes`] when it rewrote something. The orchestrator runs every
//! pass once per iteration and stops after the first iteration in which no
//! pass reported a change. A pipeline still changing after the configured
//! number of iterations is oscillating and fails with
//! [`PostprocessError::ThresholdExceeded`].

mod cte_cross_join;
mod cte_fix;
mod subquery_join;

use thiserror::Error;

pub use cte_cross_join::CteCrossJoinPass;
pub use cte_fix::CteFixPass;
pub use subquery_join::SubqueryJoinPass;

use crate::config::Settings;
use crate::cte::validate_cte_scopes;
use crate::sql::{AliasId, SqlStatement, Transformed};

/// Errors raised while postprocessing a finished statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostprocessError {
    #[error("Postprocessing threshold exceeded: still changing after {iterations} iterations")]
    ThresholdExceeded { iterations: usize },

    #[error("CTE {alias} depends on itself")]
    CteCycle { alias: AliasId },

    #[error("CTE bodies read data sources outside their scope: {aliases:?}")]
    CteScopeViolation { aliases: Vec<AliasId> },
}

pub type PostprocessResult<T> = Result<T, PostprocessError>;

/// A normalization pass over a finished statement.
pub trait Postprocessor {
    fn name(&self) -> &'static str;

    /// Called once per orchestrator run, before the first iteration.
    fn initialize(&mut self) {}

    /// Rewrite `statement`. Must return `No` with the statement untouched
    /// when there is nothing to do.
    fn process(&mut self, statement: SqlStatement)
        -> PostprocessResult<Transformed<SqlStatement>>;
}

/// The statement after postprocessing, with run statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessOutcome {
    pub statement: SqlStatement,
    /// Iterations run, the final unchanged one included.
    pub iterations: usize,
    /// Pass invocations that reported a change.
    pub changes: usize,
}

/// Runs an ordered list of passes until none of them changes the tree.
pub struct PostprocessOrchestrator {
    passes: Vec<Box<dyn Postprocessor>>,
    max_iterations: usize,
    validate_cte_scopes: bool,
}

impl PostprocessOrchestrator {
    /// An orchestrator with no passes.
    pub fn new(max_iterations: usize) -> Self {
        Self {
            passes: Vec::new(),
            max_iterations,
            validate_cte_scopes: false,
        }
    }

    /// The standard pipeline, minus the passes `settings` disables.
    pub fn from_settings(settings: &Settings) -> Self {
        let options = &settings.postprocess;
        let mut orchestrator = Self::new(options.max_iterations);
        orchestrator.validate_cte_scopes = options.validate_cte_scopes;

        if options.subquery_join {
            orchestrator = orchestrator
                .with_pass(SubqueryJoinPass::new(&settings.projection.collision_separator));
        }
        if options.cte_fix {
            orchestrator = orchestrator.with_pass(CteFixPass::new());
        }
        if options.cte_cross_join {
            orchestrator = orchestrator.with_pass(CteCrossJoinPass::new());
        }
        orchestrator
    }

    pub fn with_pass(mut self, pass: impl Postprocessor + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn with_scope_validation(mut self, enabled: bool) -> Self {
        self.validate_cte_scopes = enabled;
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, statement: SqlStatement) -> PostprocessResult<PostprocessOutcome> {
        for pass in &mut self.passes {
            pass.initialize();
        }

        let mut statement = statement;
        let mut iterations = 0;
        let mut changes = 0;
        loop {
            if iterations == self.max_iterations {
                return Err(PostprocessError::ThresholdExceeded { iterations });
            }
            iterations += 1;

            let mut changed = false;
            for pass in &mut self.passes {
                let result = pass.process(statement)?;
                if result.is_yes() {
                    log::trace!("{} changed the tree (iteration {})", pass.name(), iterations);
                    changed = true;
                    changes += 1;
                }
                statement = result.into_inner();
            }

            if !changed {
                break;
            }
        }
        log::debug!(
            "Postprocessing reached a fixed point after {} iterations ({} changes)",
            iterations,
            changes
        );

        if self.validate_cte_scopes {
            let aliases = validate_cte_scopes(&statement);
            if !aliases.is_empty() {
                return Err(PostprocessError::CteScopeViolation { aliases });
            }
        }

        Ok(PostprocessOutcome {
            statement,
            iterations,
            changes,
        })
    }
}

impl Default for PostprocessOrchestrator {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
