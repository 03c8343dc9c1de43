//! Export and restore the resumable part of a session.

#![forbid(unsafe_code)]

use hoist_api::SessionSnapshot;

use crate::{Step, Wizard};

impl Wizard {
    pub fn export_session(&self, cluster: &str) -> SessionSnapshot {
        let mut snap = SessionSnapshot::new(cluster, self.step.as_str());
        snap.cursors.insert("namespaces".into(), self.namespaces.cursor);
        snap.cursors.insert("workloads".into(), self.workloads.cursor);
        snap.cursors.insert("units".into(), self.configure.cursor);
        snap.selected_namespaces = self.namespaces.selected();
        snap
    }

    /// Reapply namespace selection and cursors. Names no longer listed are
    /// dropped; returns the saved step so callers can decide whether to resume.
    pub fn restore_session(&mut self, snap: &SessionSnapshot) -> Option<Step> {
        for p in self.namespaces.items.iter_mut() {
            p.selected = snap.selected_namespaces.contains(&p.item);
        }
        let clamp = |v: Option<&usize>, len: usize| v.copied().unwrap_or(0).min(len.saturating_sub(1));
        self.namespaces.cursor = clamp(snap.cursors.get("namespaces"), self.namespaces.items.len());
        self.workloads.cursor = clamp(snap.cursors.get("workloads"), self.workloads.items.len());
        Step::parse(&snap.step)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Pick;
    use crate::{Settings, Step, Wizard};
    use hoist_api::mock::{MockCluster, MockControllers, MockSet, MockStore};

    #[test]
    fn export_then_restore() {
        let mocks = MockSet::new(MockCluster::default(), MockStore::default(), MockControllers::default());
        let (mut w, _rx) = Wizard::new(mocks.backends(), Settings::default());
        w.namespaces.items = ["a", "b", "c"].iter().map(|n| Pick { item: n.to_string(), selected: *n != "a" }).collect();
        w.namespaces.cursor = 2;
        let snap = w.export_session("kind-dev");
        assert_eq!(snap.step, "select-namespaces");
        assert_eq!(snap.selected_namespaces, vec!["b".to_string(), "c".to_string()]);

        let (mut fresh, _rx) = Wizard::new(mocks.backends(), Settings::default());
        fresh.namespaces.items = ["b", "d"].iter().map(|n| Pick { item: n.to_string(), selected: false }).collect();
        assert_eq!(fresh.restore_session(&snap), Some(Step::SelectNamespaces));
        assert_eq!(fresh.namespaces.selected(), vec!["b".to_string()]);
        assert_eq!(fresh.namespaces.cursor, 1);
    }
}
