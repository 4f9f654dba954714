use log::debug;

use super::arena::{Arena, SlotId};
use super::class::Class;

/// Role of a class within its linked group.
///
/// Exactly one member owns the operator configuration; the others mirror
/// the stored operator passively instead of setting it independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Mirror,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupMember {
    pub class: SlotId,
    pub role: MemberRole,
}

/// Registry of linked groups for one view kind.
///
/// Group ids are dense: the id is the index into `groups`, so ids stay
/// exactly `{0, …, count-1}` by construction. Dissolving a group renumbers
/// every higher group down by one and re-stamps its member classes. Two
/// independent registries exist, one per [`ClassKind`](super::class::ClassKind);
/// they never share ids.
#[derive(Debug, Default)]
pub struct LinkedGroups {
    groups: Vec<Vec<GroupMember>>,
}

impl LinkedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn members(&self, group: u32) -> &[GroupMember] {
        self.groups
            .get(group as usize)
            .map(|members| members.as_slice())
            .unwrap_or(&[])
    }

    /// Ensure `origin` has a group, allocating the next dense id for a
    /// singleton group when it has none. Idempotent: an already-grouped
    /// class keeps its group. Returns the group id.
    pub fn create_group(&mut self, origin: SlotId, classes: &mut Arena<Class>) -> u32 {
        if let Some(group) = classes.get(origin).and_then(|class| class.linked_group) {
            return group;
        }
        let group = self.groups.len() as u32;
        self.groups.push(vec![GroupMember { class: origin, role: MemberRole::Owner }]);
        if let Some(class) = classes.get_mut(origin) {
            class.linked_group = Some(group);
        }
        debug!("created linked group {group}");
        group
    }

    /// Append a class to an existing group as a mirror and stamp it.
    pub fn add_to_group(&mut self, class_id: SlotId, group: u32, classes: &mut Arena<Class>) {
        if let Some(members) = self.groups.get_mut(group as usize) {
            members.push(GroupMember { class: class_id, role: MemberRole::Mirror });
            if let Some(class) = classes.get_mut(class_id) {
                class.linked_group = Some(group);
            }
        }
    }

    /// All other members of `class_id`'s group, in membership order.
    /// Empty for an ungrouped class.
    pub fn linked(&self, class_id: SlotId, classes: &Arena<Class>) -> Vec<SlotId> {
        let Some(group) = classes.get(class_id).and_then(|class| class.linked_group) else {
            return Vec::new();
        };
        self.members(group)
            .iter()
            .map(|member| member.class)
            .filter(|&member| member != class_id)
            .collect()
    }

    pub fn role(&self, class_id: SlotId, classes: &Arena<Class>) -> Option<MemberRole> {
        let group = classes.get(class_id)?.linked_group?;
        self.members(group)
            .iter()
            .find(|member| member.class == class_id)
            .map(|member| member.role)
    }

    /// Remove a class from its group.
    ///
    /// When the remaining membership is ≤1 the group dissolves: remaining
    /// members lose their stamp, the entry is deleted and every higher group
    /// id shifts down by one, re-stamping its members. Ids therefore stay
    /// dense after every removal. If the removed class owned the group and
    /// the group survives, ownership passes to the first remaining member.
    pub fn remove_from_group(&mut self, class_id: SlotId, classes: &mut Arena<Class>) {
        let Some(group) = classes.get(class_id).and_then(|class| class.linked_group) else {
            return;
        };
        let index = group as usize;

        let removed_owner = {
            let members = &mut self.groups[index];
            let position = members.iter().position(|member| member.class == class_id);
            let Some(position) = position else { return };
            let removed = members.remove(position);
            removed.role == MemberRole::Owner
        };
        if let Some(class) = classes.get_mut(class_id) {
            class.linked_group = None;
        }

        if self.groups[index].len() <= 1 {
            // Dissolve: the group has at most one class left in it
            for member in self.groups.remove(index) {
                if let Some(class) = classes.get_mut(member.class) {
                    class.linked_group = None;
                }
            }
            debug!("dissolved linked group {group}");

            // Shift every group above the removed one down by one
            for shifted in index..self.groups.len() {
                for member in &self.groups[shifted] {
                    if let Some(class) = classes.get_mut(member.class) {
                        class.linked_group = Some(shifted as u32);
                    }
                }
            }
        } else if removed_owner {
            self.groups[index][0].role = MemberRole::Owner;
        }

        debug_assert!(self.stamps_are_dense(classes), "linked group ids must stay dense");
    }

    /// Invariant check: every group is non-empty and every member carries
    /// the index of its group. Singleton groups are tolerated; they exist
    /// transiently between `create_group` and the first `add_to_group`.
    fn stamps_are_dense(&self, classes: &Arena<Class>) -> bool {
        self.groups.iter().enumerate().all(|(index, members)| {
            !members.is_empty()
                && members.iter().all(|member| {
                    classes
                        .get(member.class)
                        .is_some_and(|class| class.linked_group == Some(index as u32))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::class::ClassKind;

    fn class_arena(n: usize) -> (Arena<Class>, Vec<SlotId>) {
        let mut arena = Arena::new();
        let ids = (0..n)
            .map(|i| arena.insert(Class::new(format!("C{i}"), ClassKind::Configuration)))
            .collect();
        (arena, ids)
    }

    #[test]
    fn create_group_is_idempotent() {
        let (mut classes, ids) = class_arena(1);
        let mut groups = LinkedGroups::new();

        let g0 = groups.create_group(ids[0], &mut classes);
        let again = groups.create_group(ids[0], &mut classes);

        assert_eq!(g0, 0);
        assert_eq!(again, 0);
        assert_eq!(groups.group_count(), 1);
    }

    #[test]
    fn linked_excludes_self_and_empty_when_ungrouped() {
        let (mut classes, ids) = class_arena(3);
        let mut groups = LinkedGroups::new();

        assert!(groups.linked(ids[0], &classes).is_empty());

        let g = groups.create_group(ids[0], &mut classes);
        groups.add_to_group(ids[1], g, &mut classes);
        groups.add_to_group(ids[2], g, &mut classes);

        assert_eq!(groups.linked(ids[0], &classes), vec![ids[1], ids[2]]);
        assert_eq!(groups.linked(ids[1], &classes), vec![ids[0], ids[2]]);
    }

    #[test]
    fn ids_stay_dense_after_removals() {
        let (mut classes, ids) = class_arena(6);
        let mut groups = LinkedGroups::new();

        // Three groups of two
        for pair in ids.chunks(2) {
            let g = groups.create_group(pair[0], &mut classes);
            groups.add_to_group(pair[1], g, &mut classes);
        }
        assert_eq!(groups.group_count(), 3);

        // Removing one member of group 0 dissolves it; groups 1 and 2
        // renumber to 0 and 1 and their members are re-stamped.
        groups.remove_from_group(ids[0], &mut classes);
        assert_eq!(groups.group_count(), 2);
        assert_eq!(classes.get(ids[1]).unwrap().linked_group, None);
        assert_eq!(classes.get(ids[2]).unwrap().linked_group, Some(0));
        assert_eq!(classes.get(ids[3]).unwrap().linked_group, Some(0));
        assert_eq!(classes.get(ids[4]).unwrap().linked_group, Some(1));
        assert_eq!(classes.get(ids[5]).unwrap().linked_group, Some(1));

        groups.remove_from_group(ids[4], &mut classes);
        assert_eq!(groups.group_count(), 1);
        assert_eq!(classes.get(ids[5]).unwrap().linked_group, None);
        assert_eq!(classes.get(ids[2]).unwrap().linked_group, Some(0));
    }

    #[test]
    fn surviving_group_keeps_a_single_owner() {
        let (mut classes, ids) = class_arena(3);
        let mut groups = LinkedGroups::new();

        let g = groups.create_group(ids[0], &mut classes);
        groups.add_to_group(ids[1], g, &mut classes);
        groups.add_to_group(ids[2], g, &mut classes);
        assert_eq!(groups.role(ids[0], &classes), Some(MemberRole::Owner));
        assert_eq!(groups.role(ids[1], &classes), Some(MemberRole::Mirror));

        groups.remove_from_group(ids[0], &mut classes);
        assert_eq!(groups.role(ids[1], &classes), Some(MemberRole::Owner));
        assert_eq!(groups.role(ids[2], &classes), Some(MemberRole::Mirror));
    }

    #[test]
    fn in_construction_singleton_survives_a_dissolve() {
        let (mut classes, ids) = class_arena(4);
        let mut groups = LinkedGroups::new();

        let g = groups.create_group(ids[0], &mut classes);
        groups.add_to_group(ids[1], g, &mut classes);
        // A second group still being built: only its origin so far
        let building = groups.create_group(ids[2], &mut classes);
        assert_eq!(building, 1);

        groups.remove_from_group(ids[0], &mut classes);

        // The pair dissolved; the in-construction group renumbered to 0
        assert_eq!(groups.group_count(), 1);
        assert_eq!(classes.get(ids[2]).unwrap().linked_group, Some(0));

        groups.add_to_group(ids[3], 0, &mut classes);
        assert_eq!(groups.linked(ids[2], &classes), vec![ids[3]]);
    }

    #[test]
    fn remove_ungrouped_is_noop() {
        let (mut classes, ids) = class_arena(1);
        let mut groups = LinkedGroups::new();
        groups.remove_from_group(ids[0], &mut classes);
        assert_eq!(groups.group_count(), 0);
    }
}
