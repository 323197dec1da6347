use super::common::*;
use crate::lifecycle::adoption::Decision;
use crate::lifecycle::domain::{PetListing, PetStatus, Sex};
use crate::lifecycle::error::LifecycleError;

fn listing(name: &str) -> PetListing {
    PetListing {
        name: name.to_string(),
        species: "cat".to_string(),
        breed: None,
        age_months: Some(4),
        sex: Sex::Female,
        description: "Shy at first, loves laps.".to_string(),
        images: vec!["https://cdn.petmarket.test/mochi.jpg".to_string()],
    }
}

#[test]
fn verified_shelter_lists_available_pet() {
    let market = marketplace();

    let pet = market
        .services
        .pets
        .create(&shelter_user(), listing(" Mochi "))
        .expect("listing succeeds");

    assert_eq!(pet.name, "Mochi");
    assert_eq!(pet.shelter, shelter());
    assert_eq!(pet.status, PetStatus::Available);
    assert!(market.pet(&pet.id).is_some());
}

#[test]
fn unverified_shelter_cannot_list_pets() {
    let market = marketplace();

    match market
        .services
        .pets
        .create(&unverified_shelter_user(), listing("Mochi"))
    {
        Err(LifecycleError::EntityNotVerified { entity }) => {
            assert_eq!(entity, unverified_shelter())
        }
        other => panic!("expected unverified shelter, got {other:?}"),
    }
}

#[test]
fn listing_requires_name_and_species() {
    let market = marketplace();
    let mut blank = listing("  ");
    assert!(matches!(
        market.services.pets.create(&shelter_user(), blank.clone()),
        Err(LifecycleError::InvalidInput { field: "name", .. })
    ));

    blank.name = "Mochi".to_string();
    blank.species = String::new();
    assert!(matches!(
        market.services.pets.create(&shelter_user(), blank),
        Err(LifecycleError::InvalidInput {
            field: "species",
            ..
        })
    ));
}

#[test]
fn manual_transitions_follow_the_table() {
    let market = marketplace();

    assert!(matches!(
        market
            .services
            .pets
            .transition(&shelter_user(), &rex(), PetStatus::Adopted),
        Err(LifecycleError::IllegalPetTransition { .. })
    ));
    assert!(matches!(
        market
            .services
            .pets
            .transition(&shelter_user(), &rex(), PetStatus::Available),
        Err(LifecycleError::NoOpRejected { .. })
    ));

    let pet = market
        .services
        .pets
        .transition(&shelter_user(), &rex(), PetStatus::InProcess)
        .expect("available to in process");
    assert_eq!(pet.status, PetStatus::InProcess);

    assert!(matches!(
        market
            .services
            .pets
            .transition(&rival_shelter_user(), &rex(), PetStatus::Available),
        Err(LifecycleError::NotPetOwner)
    ));
}

#[test]
fn adopted_pet_with_approval_cannot_be_reopened() {
    let market = marketplace();
    let adoption = market
        .services
        .adoptions
        .submit(&ada(), &rex(), None)
        .expect("submission");
    market
        .services
        .adoptions
        .decide(&shelter_user(), &adoption.id, Decision::Approve, None)
        .expect("approval");

    match market
        .services
        .pets
        .transition(&shelter_user(), &rex(), PetStatus::Available)
    {
        Err(LifecycleError::PetHasApproval { pet }) => assert_eq!(pet, rex()),
        other => panic!("expected approval conflict, got {other:?}"),
    }
    assert_eq!(market.pet_status(&rex()), PetStatus::Adopted);
}

#[test]
fn removal_cascades_to_applications() {
    let market = marketplace();
    for adopter in [ada(), ben()] {
        market
            .services
            .adoptions
            .submit(&adopter, &rex(), None)
            .expect("submission");
    }

    let removal = market
        .services
        .pets
        .remove(&shelter_user(), &rex())
        .expect("owner removes listing");

    assert_eq!(removal.removed_applications, 2);
    assert!(market.pet(&rex()).is_none());
    assert!(market.adoptions_for(&rex()).is_empty());
}

#[test]
fn removal_by_another_shelter_leaves_everything_in_place() {
    let market = marketplace();
    market
        .services
        .adoptions
        .submit(&ada(), &rex(), None)
        .expect("submission");

    assert!(matches!(
        market.services.pets.remove(&rival_shelter_user(), &rex()),
        Err(LifecycleError::NotPetOwner)
    ));
    assert!(market.pet(&rex()).is_some());
    assert_eq!(market.adoptions_for(&rex()).len(), 1);
}
