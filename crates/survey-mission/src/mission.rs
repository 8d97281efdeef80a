use survey_core::{GeoPoint, MissionId, Waypoint};
use survey_planner::PlannedRoute;

/// A planned route bound to a home position, consumed in order.
///
/// The cursor only moves once arrival at the current waypoint is confirmed.
#[derive(Debug, Clone)]
pub struct Mission {
    id: MissionId,
    home: GeoPoint,
    route: PlannedRoute,
    cursor: usize,
}

impl Mission {
    pub fn new(id: MissionId, home: GeoPoint, route: PlannedRoute) -> Self {
        Self {
            id,
            home,
            route,
            cursor: 0,
        }
    }

    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn home(&self) -> GeoPoint {
        self.home
    }

    pub fn route(&self) -> &PlannedRoute {
        &self.route
    }

    pub fn current(&self) -> Option<&Waypoint> {
        self.route.waypoints.get(self.cursor)
    }

    pub fn reached(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.route.len()
    }

    pub fn remaining(&self) -> &[Waypoint] {
        &self.route.waypoints[self.cursor..]
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.route.len()
    }
}

/// Yields the waypoint at the cursor and moves past it. The supervisor only
/// calls this once arrival has been confirmed.
impl Iterator for Mission {
    type Item = Waypoint;

    fn next(&mut self) -> Option<Waypoint> {
        let waypoint = self.current().copied()?;
        self.cursor += 1;
        Some(waypoint)
    }
}
