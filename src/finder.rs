use crate::api::FindRequest;
use crate::assemble::{assemble, Entity};
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::include::normalize;
use crate::plan::build_plan;
use crate::schema::Schema;
use log::debug;

/// Entry point for find requests: normalize against the registry, build
/// the join plan, execute, assemble. Construction is pure and stateless,
/// so one `Finder` serves any number of concurrent requests.
pub struct Finder<'a, E> {
    schema: &'a Schema,
    executor: &'a E,
}

#[derive(Debug, PartialEq)]
pub struct CountedRows {
    pub count: u64,
    pub rows: Vec<Entity>,
}

impl<'a, E: QueryExecutor> Finder<'a, E> {
    pub fn new(schema: &'a Schema, executor: &'a E) -> Self {
        Finder { schema, executor }
    }

    /// First matching root entity, with its include tree populated.
    pub async fn find(&self, root: &str, request: FindRequest) -> Result<Option<Entity>> {
        Ok(self.find_all(root, request).await?.into_iter().next())
    }

    pub async fn find_all(&self, root: &str, request: FindRequest) -> Result<Vec<Entity>> {
        // all caller errors surface here, before any query is issued
        let tree = normalize(self.schema, root, &request)?;
        let plan = build_plan(self.schema, &tree, request.where_.clone(), &request.order)?;
        let rows = self.executor.execute(&plan).await?;
        debug!("{}: {} rows for {} joins", root, rows.len(), plan.joins.len());
        assemble(&tree, &rows)
    }

    /// Count-and-fetch. `count` is the number of distinct root entities
    /// matching all filters; the whole call fails if either query fails.
    pub async fn find_and_count_all(&self, root: &str, request: FindRequest) -> Result<CountedRows> {
        let tree = normalize(self.schema, root, &request)?;
        let plan = build_plan(self.schema, &tree, request.where_.clone(), &request.order)?;
        let count = self.executor.count(&plan).await?;
        let rows = self.executor.execute(&plan).await?;
        Ok(CountedRows { count, rows: assemble(&tree, &rows)? })
    }
}
