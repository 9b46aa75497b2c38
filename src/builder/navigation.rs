//! Joins added implicitly to reach a navigation member.

use super::{ConversionContext, QueryBuilder, QueryError, QueryResult};
use crate::metadata::{MetadataProvider, NavigationKind};
use crate::sql::{col, AliasId, ExprExt, Join, JoinKind, ModelPath, SqlExpr};

impl QueryBuilder {
    /// Join the entity reached by `member` from the source at `parent`, a
    /// table or a wrapped unit still exposing one.
    ///
    /// Only to-one navigations are joinable: a required parent becomes an
    /// INNER JOIN, an optional parent or single child a LEFT JOIN marked
    /// default-if-empty. Each parent/member pair is joined once; repeated
    /// navigation returns the existing alias.
    pub fn navigate(
        &mut self,
        ctx: &mut ConversionContext,
        provider: &dyn MetadataProvider,
        parent: &ModelPath,
        member: &str,
    ) -> QueryResult<AliasId> {
        let target_path = parent.child(member);
        if let Some(alias) = self.navigations.get(&target_path) {
            return Ok(*alias);
        }

        let parent_source = self
            .unit
            .source_at_path(parent)
            .ok_or_else(|| QueryError::UnresolvedMember {
                path: target_path.clone(),
            })?;
        let parent_alias = parent_source.alias;
        let entity = parent_source
            .entity()
            .ok_or_else(|| QueryError::UnresolvedMember {
                path: target_path.clone(),
            })?
            .to_string();

        let navigation = provider
            .navigation(&entity, member)
            .ok_or_else(|| QueryError::UnresolvedMember {
                path: target_path.clone(),
            })?;

        let (kind, default_if_empty) = match navigation.kind {
            NavigationKind::ToParent => (JoinKind::Inner, false),
            NavigationKind::ToParentOptional | NavigationKind::ToSingleChild => {
                (JoinKind::Left, true)
            }
            NavigationKind::ToChildren => {
                return Err(QueryError::NotAToOneNavigation {
                    entity,
                    member: member.to_string(),
                })
            }
        };

        let target = ctx
            .table_source(provider, &navigation.target)?
            .with_model_path(target_path.clone())
            .with_default_if_empty(default_if_empty);
        let target_alias = target.alias;

        let mut keys = Vec::with_capacity(navigation.keys.len());
        for key in &navigation.keys {
            let from = parent_source
                .column_for_path(&ModelPath::parse(&key.from))
                .ok_or_else(|| QueryError::UnresolvedMember {
                    path: ModelPath::parse(&key.from).prepend(parent),
                })?;
            let to = target
                .column_for_path(&ModelPath::parse(&key.to))
                .ok_or_else(|| QueryError::UnresolvedMember {
                    path: target_path.child(&key.to),
                })?;
            keys.push(col(parent_alias, &from).eq(col(target_alias, &to)));
        }
        let condition = SqlExpr::conjunction(keys).ok_or_else(|| {
            QueryError::InvalidArgument(format!(
                "navigation {}.{} has no key columns",
                entity, member
            ))
        })?;

        ctx.attach(target_alias)?;
        self.unit.joins.push(Join {
            kind,
            source: target,
            condition: Some(condition),
            navigation: true,
        });
        self.navigations.insert(target_path, target_alias);

        log::trace!(
            "Navigation {}.{} joined as {}",
            entity,
            member,
            ctx.alias_name(target_alias)
        );
        Ok(target_alias)
    }
}
