use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::PlayerSnapshot;

/// Heroes whose equipment can serve as a verification challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeroKind {
    BarbarianKing,
    ArcherQueen,
    GrandWarden,
    RoyalChampion,
    MinionPrince,
}

pub const MONITORED_HEROES: [HeroKind; 5] = [
    HeroKind::BarbarianKing,
    HeroKind::ArcherQueen,
    HeroKind::GrandWarden,
    HeroKind::RoyalChampion,
    HeroKind::MinionPrince,
];

impl HeroKind {
    /// Hero name as the API reports it
    pub fn api_name(self) -> &'static str {
        match self {
            HeroKind::BarbarianKing => "Barbarian King",
            HeroKind::ArcherQueen => "Archer Queen",
            HeroKind::GrandWarden => "Grand Warden",
            HeroKind::RoyalChampion => "Royal Champion",
            HeroKind::MinionPrince => "Minion Prince",
        }
    }

    pub fn equipment(self) -> &'static [&'static str] {
        match self {
            HeroKind::BarbarianKing => &[
                "Barbarian Puppet",
                "Rage Vial",
                "Earthquake Boots",
                "Vampstache",
                "Giant Gauntlet",
                "Spiky Ball",
                "Snake Bracelet",
            ],
            HeroKind::ArcherQueen => &[
                "Archer Puppet",
                "Invisibility Vial",
                "Giant Arrow",
                "Healer Puppet",
                "Frozen Arrow",
                "Magic Mirror",
                "Action Figure",
            ],
            HeroKind::GrandWarden => &[
                "Eternal Tome",
                "Life Gem",
                "Rage Gem",
                "Healing Tome",
                "Fireball",
                "Lavaloon Puppet",
                "Heroic Torch",
            ],
            HeroKind::RoyalChampion => &[
                "Royal Gem",
                "Seeking Shield",
                "Hog Rider Puppet",
                "Haste Vial",
                "Rocket Spear",
                "Electro Boots",
            ],
            HeroKind::MinionPrince => &[
                "Henchmen Puppet",
                "Dark Orb",
                "Metal Pants",
                "Noble Iron",
                "Dark Crown",
            ],
        }
    }

    /// Which monitored hero an equipment piece belongs to
    pub fn owner_of(equipment_name: &str) -> Option<HeroKind> {
        MONITORED_HEROES
            .into_iter()
            .find(|hero| hero.equipment().contains(&equipment_name))
    }
}

/// The equipment piece a user must equip to prove account ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishingItem {
    pub hero: HeroKind,
    pub name: String,
    pub level: u32,
}

/// Whether the item is currently equipped on its owning hero
pub fn is_equipped(player: &PlayerSnapshot, item: &DistinguishingItem) -> bool {
    player
        .hero(item.hero.api_name())
        .map(|hero| hero.equipment.iter().any(|e| e.name == item.name))
        .unwrap_or(false)
}

/// Owned items that can be used as a challenge: belongs to a monitored hero
/// the player has unlocked, upgraded past level 1, and not equipped right now.
pub fn eligible_items(player: &PlayerSnapshot) -> Vec<DistinguishingItem> {
    player
        .hero_equipment
        .iter()
        .filter(|equipment| equipment.level > 1)
        .filter_map(|equipment| {
            let hero = HeroKind::owner_of(&equipment.name)?;
            let unlocked = player.hero(hero.api_name())?;
            let equipped = unlocked.equipment.iter().any(|e| e.name == equipment.name);
            (!equipped).then(|| DistinguishingItem {
                hero,
                name: equipment.name.clone(),
                level: equipment.level,
            })
        })
        .collect()
}

/// Pick one eligible item uniformly at random
pub fn choose_distinguishing_item<R: Rng + ?Sized>(
    player: &PlayerSnapshot,
    rng: &mut R,
) -> Option<DistinguishingItem> {
    eligible_items(player).choose(rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{equip, player_with_equipment};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_owner_lookup() {
        assert_eq!(HeroKind::owner_of("Rage Vial"), Some(HeroKind::BarbarianKing));
        assert_eq!(HeroKind::owner_of("Frozen Arrow"), Some(HeroKind::ArcherQueen));
        assert_eq!(HeroKind::owner_of("Wooden Spoon"), None);
    }

    #[test]
    fn test_excludes_equipped_and_level_one() {
        let player = player_with_equipment(
            &[("Barbarian King", &["Giant Gauntlet", "Rage Vial"])],
            &[
                ("Giant Gauntlet", 12),
                ("Rage Vial", 9),
                ("Barbarian Puppet", 1),
                ("Vampstache", 4),
            ],
        );

        let eligible = eligible_items(&player);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name, "Vampstache");
        assert_eq!(eligible[0].hero, HeroKind::BarbarianKing);
    }

    #[test]
    fn test_skips_heroes_not_unlocked() {
        // Queen equipment is owned but the player has no Archer Queen yet
        let player = player_with_equipment(
            &[("Barbarian King", &["Giant Gauntlet"])],
            &[("Giant Gauntlet", 3), ("Frozen Arrow", 5)],
        );
        assert!(eligible_items(&player).is_empty());
    }

    #[test]
    fn test_chosen_item_never_equipped() {
        let player = player_with_equipment(
            &[
                ("Barbarian King", &["Giant Gauntlet", "Rage Vial"]),
                ("Archer Queen", &["Frozen Arrow", "Giant Arrow"]),
            ],
            &[
                ("Giant Gauntlet", 12),
                ("Rage Vial", 9),
                ("Vampstache", 4),
                ("Frozen Arrow", 10),
                ("Giant Arrow", 10),
                ("Healer Puppet", 6),
                ("Magic Mirror", 2),
            ],
        );

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let item = choose_distinguishing_item(&player, &mut rng).unwrap();
            assert!(!is_equipped(&player, &item), "{} was equipped", item.name);
            assert!(item.level > 1);
        }
    }

    #[test]
    fn test_none_when_nothing_eligible() {
        let player = player_with_equipment(
            &[("Barbarian King", &["Barbarian Puppet"])],
            &[("Barbarian Puppet", 5), ("Rage Vial", 1)],
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert!(choose_distinguishing_item(&player, &mut rng).is_none());
    }

    #[test]
    fn test_is_equipped_after_swap() {
        let mut player = player_with_equipment(
            &[("Barbarian King", &["Giant Gauntlet"])],
            &[("Giant Gauntlet", 3), ("Vampstache", 4)],
        );
        let item = eligible_items(&player).remove(0);
        assert!(!is_equipped(&player, &item));

        equip(&mut player, "Barbarian King", "Vampstache");
        assert!(is_equipped(&player, &item));
    }
}
