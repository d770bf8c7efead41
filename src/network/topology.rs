use super::{Node, NodeId, NodeSet, Position};
use crate::error::{ScenarioError, ScenarioResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridLayout {
    /// Fill a row of `grid_width` nodes, then move down
    #[default]
    RowFirst,
    /// Fill a column of `grid_width` nodes, then move right
    ColumnFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: u32,
    pub layout: GridLayout,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            min_x: 20.0,
            min_y: 20.0,
            delta_x: 20.0,
            delta_y: 20.0,
            grid_width: 5,
            layout: GridLayout::RowFirst,
        }
    }
}

impl GridSpec {
    pub fn validate(&self) -> ScenarioResult<()> {
        if self.grid_width == 0 {
            return Err(ScenarioError::InvalidGrid("grid width must be positive".into()));
        }
        let coords = [self.min_x, self.min_y, self.delta_x, self.delta_y];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(ScenarioError::InvalidGrid("grid coordinates must be finite".into()));
        }
        if self.delta_x < 0.0 || self.delta_y < 0.0 {
            return Err(ScenarioError::InvalidGrid("grid spacing cannot be negative".into()));
        }
        Ok(())
    }

    pub fn position(&self, index: u32) -> Position {
        let (major, minor) = (index / self.grid_width, index % self.grid_width);
        let (col, row) = match self.layout {
            GridLayout::RowFirst => (minor, major),
            GridLayout::ColumnFirst => (major, minor),
        };
        Position::new(
            self.min_x + self.delta_x * col as f64,
            self.min_y + self.delta_y * row as f64,
        )
    }
}

pub fn build_topology(count: u32, grid: &GridSpec) -> ScenarioResult<NodeSet> {
    if count == 0 {
        return Err(ScenarioError::InvalidNodeCount(count));
    }
    grid.validate()?;

    let nodes = (0..count)
        .map(|i| Node::new(NodeId(i), grid.position(i)))
        .collect();

    debug!("Created {} nodes on a {:?} grid {} wide", count, grid.layout, grid.grid_width);
    Ok(NodeSet::from_nodes(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_first_fills_left_to_right_then_down() {
        let nodes = build_topology(7, &GridSpec::default()).unwrap();
        let positions: Vec<_> = nodes.iter().map(|n| (n.position().x, n.position().y)).collect();

        assert_eq!(positions[0], (20.0, 20.0));
        assert_eq!(positions[4], (100.0, 20.0));
        assert_eq!(positions[5], (20.0, 40.0));
        assert_eq!(positions[6], (40.0, 40.0));
    }

    #[test]
    fn column_first_fills_top_to_bottom_then_right() {
        let grid = GridSpec {
            layout: GridLayout::ColumnFirst,
            grid_width: 2,
            ..GridSpec::default()
        };
        let nodes = build_topology(3, &grid).unwrap();
        let last = nodes.get(NodeId(2)).unwrap().position();
        assert_eq!((last.x, last.y), (40.0, 20.0));
    }

    #[test]
    fn ids_follow_creation_order() {
        let nodes = build_topology(20, &GridSpec::default()).unwrap();
        let ids: Vec<u32> = nodes.ids().map(|id| id.0).collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
        assert!(nodes.iter().all(|n| !n.has_stack() && n.address().is_none()));
    }

    #[test]
    fn zero_nodes_is_rejected() {
        assert_eq!(
            build_topology(0, &GridSpec::default()).unwrap_err(),
            ScenarioError::InvalidNodeCount(0)
        );
    }

    #[test]
    fn zero_width_grid_is_rejected() {
        let grid = GridSpec { grid_width: 0, ..GridSpec::default() };
        assert!(matches!(build_topology(3, &grid), Err(ScenarioError::InvalidGrid(_))));
    }
}
