// Route table builder - applies association and propagation rules to a plan

use super::{Route, RouteTable, RouteTables, RouteTarget};
use crate::error::{SimError, SimResult};
use crate::plan::Vpc;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    tables: BTreeMap<String, RouteTable>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        RouteTableBuilder::default()
    }

    /// Derive every route table from a VPC list.
    ///
    /// Each VPC gets a direct route in its associate table and a propagated
    /// route in every table it propagates to. The build is all-or-nothing: a
    /// conflict aborts it and no tables are returned.
    pub fn from_vpcs(vpcs: &[Vpc]) -> SimResult<RouteTables> {
        let mut builder = RouteTableBuilder::new();

        for (vpc_index, vpc) in vpcs.iter().enumerate() {
            let route = Route {
                destination: vpc.cidr,
                target: RouteTarget::for_vpc(vpc_index, vpc),
            };

            builder.add_route(&vpc.associate_with, route.clone())?;
            for table in &vpc.propagate_to {
                builder.add_route(table, route.clone())?;
            }
        }

        let tables = builder.build();
        for table in tables.iter() {
            tracing::debug!("Route table {} has {} route(s)", table.name, table.len());
            for route in table.routes() {
                tracing::trace!("{}: {} -> {}", table.name, route.destination, route.target.label());
            }
        }
        Ok(tables)
    }

    /// Add a route, treating a repeat of the same CIDR to the same
    /// attachment as a no-op.
    pub fn add_route(&mut self, table_name: &str, route: Route) -> SimResult<()> {
        let table = self
            .tables
            .entry(table_name.to_string())
            .or_insert_with(|| RouteTable::new(table_name));

        if let Some(existing) = table.index.get(&route.destination) {
            if existing.target.same_attachment(&route.target) {
                tracing::trace!(
                    "{} already routed to {} in {}",
                    route.destination,
                    route.target.label(),
                    table_name
                );
                return Ok(());
            }
            return Err(SimError::RouteConflict {
                table: table_name.to_string(),
                cidr: route.destination.to_string(),
                existing: existing.target.label(),
                conflicting: route.target.label(),
            });
        }

        table.index.insert(route.destination, route)
    }

    pub fn build(self) -> RouteTables {
        RouteTables {
            tables: self.tables,
        }
    }
}
