// Breakpoint registry
//
// Owns every logical breakpoint of a target. Operations taking breakpoint
// references validate all of them before mutating anything.

use crate::breakpoint::{Breakpoint, BreakpointAction, BreakpointSpec, CommandSource};
use crate::error::{BkptResult, BreakpointError};
use crate::resolver::ResolvedLocation;
use crate::types::{Address, BreakpointId, BreakpointRef, LocationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Creation-time options (`-N name`, `-d`, `-C command`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    pub names: Vec<String>,
    pub enabled: bool,
    pub commands: Option<CommandSource>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            enabled: true,
            commands: None,
        }
    }
}

/// One location stopped at, with the action to run for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationHit {
    pub location: LocationId,
    pub hit_count: u32,
    pub action: Option<BreakpointAction>,
}

#[derive(Debug)]
pub struct BreakpointRegistry {
    next_id: u32,
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> BkptResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| !c.is_ascii_digit())
        && !name.contains(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(BreakpointError::InvalidName(name.to_string()))
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            breakpoints: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Breakpoint> {
        self.breakpoints.values_mut()
    }

    /// Store a new breakpoint with its initial locations.
    ///
    /// `installed` marks the locations resolved, for breakpoints created
    /// while a process is running.
    pub fn create(
        &mut self,
        spec: BreakpointSpec,
        locations: Vec<ResolvedLocation>,
        resolve_time: Duration,
        options: CreateOptions,
        installed: bool,
    ) -> BkptResult<BreakpointId> {
        let action = options.commands.map(CommandSource::into_action).transpose()?;
        for name in &options.names {
            validate_name(name)?;
        }

        let id = BreakpointId(self.next_id);
        self.next_id += 1;

        let mut bp = Breakpoint::new(id, spec);
        bp.enabled = options.enabled;
        bp.names = options.names.into_iter().collect();
        bp.action = action;
        bp.resolve_time = resolve_time;
        for location in locations {
            bp.add_location(location);
        }
        if installed && bp.enabled {
            bp.locations_mut().for_each(|l| l.resolved = true);
        }

        info!(
            "Created breakpoint {}: {} ({} locations)",
            id,
            bp.spec.describe(),
            bp.locations().len()
        );
        self.breakpoints.insert(id, bp);
        Ok(id)
    }

    /// Expand references to breakpoint IDs, failing on the first bad one
    pub fn find_ids(&self, refs: &[BreakpointRef]) -> BkptResult<Vec<BreakpointId>> {
        let mut ids = Vec::new();
        for r in refs {
            match r {
                BreakpointRef::Id(id) => {
                    if !self.breakpoints.contains_key(id) {
                        return Err(BreakpointError::InvalidId(id.to_string()));
                    }
                    ids.push(*id);
                }
                BreakpointRef::Name(name) => {
                    let named: Vec<BreakpointId> = self
                        .breakpoints
                        .values()
                        .filter(|bp| bp.names.contains(name))
                        .map(|bp| bp.id)
                        .collect();
                    if named.is_empty() {
                        return Err(BreakpointError::UnknownName(name.clone()));
                    }
                    ids.extend(named);
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub fn delete(&mut self, refs: &[BreakpointRef]) -> BkptResult<Vec<BreakpointId>> {
        let ids = self.find_ids(refs)?;
        for id in &ids {
            self.breakpoints.remove(id);
        }
        info!("Deleted breakpoints {:?}", ids);
        Ok(ids)
    }

    pub fn delete_all(&mut self) -> usize {
        let count = self.breakpoints.len();
        self.breakpoints.clear();
        info!("Deleted all {} breakpoints", count);
        count
    }

    /// Delete every disabled breakpoint not carrying `protecting_name`
    pub fn delete_disabled(&mut self, protecting_name: Option<&str>) -> Vec<BreakpointId> {
        let doomed: Vec<BreakpointId> = self
            .breakpoints
            .values()
            .filter(|bp| !bp.enabled)
            .filter(|bp| protecting_name.map_or(true, |name| !bp.names.contains(name)))
            .map(|bp| bp.id)
            .collect();

        for id in &doomed {
            self.breakpoints.remove(id);
        }
        info!(
            "Deleted disabled breakpoints {:?} (protected name: {:?})",
            doomed, protecting_name
        );
        doomed
    }

    pub fn set_enabled(
        &mut self,
        refs: &[BreakpointRef],
        enabled: bool,
        installed: bool,
    ) -> BkptResult<Vec<BreakpointId>> {
        let ids = self.find_ids(refs)?;
        for id in &ids {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                bp.enabled = enabled;
                let resolved = enabled && installed;
                bp.locations_mut().for_each(|l| l.resolved = resolved);
            }
        }
        Ok(ids)
    }

    pub fn add_name(&mut self, refs: &[BreakpointRef], name: &str) -> BkptResult<Vec<BreakpointId>> {
        validate_name(name)?;
        let ids = self.find_ids(refs)?;
        for id in &ids {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                bp.names.insert(name.to_string());
            }
        }
        Ok(ids)
    }

    pub fn remove_name(&mut self, refs: &[BreakpointRef], name: &str) -> BkptResult<Vec<BreakpointId>> {
        let ids = self.find_ids(refs)?;
        for id in &ids {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                bp.names.remove(name);
            }
        }
        Ok(ids)
    }

    /// Attach an action, replacing whatever was attached before
    pub fn attach_commands(
        &mut self,
        refs: &[BreakpointRef],
        source: CommandSource,
    ) -> BkptResult<Vec<BreakpointId>> {
        let action = source.into_action()?;
        let ids = self.find_ids(refs)?;
        for id in &ids {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                debug!("Breakpoint {} action: {:?}", id, action);
                bp.action = Some(action.clone());
            }
        }
        Ok(ids)
    }

    pub fn detach_commands(&mut self, refs: &[BreakpointRef]) -> BkptResult<Vec<BreakpointId>> {
        let ids = self.find_ids(refs)?;
        for id in &ids {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                bp.action = None;
            }
        }
        Ok(ids)
    }

    pub fn command_list(&self, r: &BreakpointRef) -> BkptResult<String> {
        let ids = self.find_ids(std::slice::from_ref(r))?;
        Ok(ids
            .iter()
            .filter_map(|id| self.breakpoints.get(id))
            .map(Breakpoint::command_description)
            .collect())
    }

    pub fn list(&self, include_locations: bool) -> String {
        if self.breakpoints.is_empty() {
            return "No breakpoints currently set.\n".to_string();
        }

        let mut out = String::from("Current breakpoints:\n");
        for bp in self.breakpoints.values() {
            out.push_str(&bp.describe(include_locations));
            out.push('\n');
        }
        out
    }

    /// Drop locations owned by an unloaded module
    pub fn remove_module(&mut self, module: &str) -> usize {
        self.breakpoints
            .values_mut()
            .map(|bp| bp.remove_module_locations(module))
            .sum()
    }

    /// Start of a fresh run: hit counts restart and enabled sites are installed
    pub fn on_process_launch(&mut self) {
        for bp in self.breakpoints.values_mut() {
            let enabled = bp.enabled;
            bp.locations_mut().for_each(|l| {
                l.hit_count = 0;
                l.resolved = enabled;
            });
        }
    }

    /// Count a stop at `address`, returning the hits in breakpoint order.
    ///
    /// With `module` given, only locations in that module count.
    pub fn on_hit(&mut self, address: Address, module: Option<&str>) -> Vec<LocationHit> {
        let mut hits = Vec::new();
        for bp in self.breakpoints.values_mut() {
            if !bp.enabled {
                continue;
            }
            let action = bp.action.clone();
            for location in bp.locations_mut() {
                if location.address != address || !location.resolved {
                    continue;
                }
                if module.is_some_and(|m| m != location.module) {
                    continue;
                }
                location.hit_count += 1;
                hits.push(LocationHit {
                    location: location.id,
                    hit_count: location.hit_count,
                    action: action.clone(),
                });
            }
        }
        hits
    }

    /// The process went away; sites are gone but counts stay visible
    pub fn on_process_exit(&mut self) {
        for bp in self.breakpoints.values_mut() {
            bp.locations_mut().for_each(|l| l.resolved = false);
        }
    }
}
