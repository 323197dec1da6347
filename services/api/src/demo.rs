use crate::infra::{seed_users, InMemoryNotifier, Marketplace};
use clap::Args;
use petmarket::config::PolicyConfig;
use petmarket::error::AppError;
use petmarket::lifecycle::{
    classify_role_change, BlockAction, BusinessProfile, Decision, EntityKind, LifecycleError,
    LifecycleServices, MemoryStore, PetListing, RequestOrigin, Role, Sex, UserId,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print every queued notification at the end of the demo.
    #[arg(long)]
    pub(crate) show_notifications: bool,
    /// Print the audit trail of each moderated account.
    #[arg(long)]
    pub(crate) show_audit: bool,
}

const ADMIN: &str = "usr-admin";
const SHELTER: &str = "usr-happy-tails";
const ADOPTERS: [&str; 3] = ["usr-ada", "usr-ben", "usr-cy"];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::new());
    seed_users(
        &store,
        &[
            (ADMIN, "Avery (admin)", Role::Admin),
            (SHELTER, "Happy Tails", Role::Shelter),
            (ADOPTERS[0], "Ada", Role::Adopter),
            (ADOPTERS[1], "Ben", Role::Adopter),
            (ADOPTERS[2], "Cy", Role::Adopter),
        ],
    )?;
    let notifier = Arc::new(InMemoryNotifier::default());
    let market = LifecycleServices::new(store, notifier.clone(), PolicyConfig::default());
    let admin = UserId::new(ADMIN);
    let shelter = UserId::new(SHELTER);
    let origin = RequestOrigin {
        ip_address: Some("127.0.0.1".to_string()),
        client: Some("petmarket-demo".to_string()),
    };

    println!("Pet marketplace lifecycle demo");

    println!("\nShelter verification");
    let entity = market.verification.apply(
        &shelter,
        EntityKind::Shelter,
        BusinessProfile {
            name: "Happy Tails Rescue".to_string(),
            contact_email: "team@happytails.example".to_string(),
            phone: None,
            address: Some("12 Elm St".to_string()),
            registration_number: None,
        },
    )?;
    println!("- {} applied as {} ({:?})", SHELTER, entity.id, entity.state());
    market.verification.decide(
        &admin,
        &entity.id,
        Decision::Reject,
        Some("Missing legal registration"),
        origin.clone(),
    )?;
    println!("- admin rejected: Missing legal registration");
    report("listing a pet before verification", market.pets.create(&shelter, listing()));

    let mut resubmitted = entity.profile.clone();
    resubmitted.registration_number = Some("IA-44120".to_string());
    market
        .verification
        .apply(&shelter, EntityKind::Shelter, resubmitted)?;
    market
        .verification
        .decide(&admin, &entity.id, Decision::Approve, None, origin.clone())?;
    println!("- resubmitted with registration number and approved");

    println!("\nAdoption flow");
    let pet = market.pets.create(&shelter, listing())?;
    println!("- listed {} ({}) -> {}", pet.name, pet.id, pet.status);
    let first = market.adoptions.submit(
        &UserId::new(ADOPTERS[0]),
        &pet.id,
        Some("We have a fenced yard.".to_string()),
    )?;
    let second = market
        .adoptions
        .submit(&UserId::new(ADOPTERS[1]), &pet.id, None)?;
    println!(
        "- {} and {} applied ({} / {})",
        first.adopter, second.adopter, first.status, second.status
    );
    let outcome = market
        .adoptions
        .decide(&shelter, &first.id, Decision::Approve, None)?;
    println!(
        "- approved {}: pet {} -> {}",
        outcome.adoption.id, outcome.previous_pet_status, outcome.pet_status
    );
    report(
        "approving the second application",
        market
            .adoptions
            .decide(&shelter, &second.id, Decision::Approve, None),
    );
    report(
        "late application",
        market
            .adoptions
            .submit(&UserId::new(ADOPTERS[2]), &pet.id, None),
    );

    println!("\nModeration");
    let target = UserId::new(ADOPTERS[2]);
    let blocked = market.access.set_block_state(
        &admin,
        &target,
        BlockAction::Block,
        "Spam reports",
        origin.clone(),
    )?;
    let view = blocked.audit.view();
    println!(
        "- blocked {}: {} -> {} (audit {})",
        target, view.old_value, view.new_value, view.id
    );
    report(
        "blocking again",
        market.access.set_block_state(
            &admin,
            &target,
            BlockAction::Block,
            "Spam reports",
            origin.clone(),
        ),
    );
    report(
        "blocking self",
        market.access.set_block_state(
            &admin,
            &admin,
            BlockAction::Block,
            "Testing self protection",
            origin.clone(),
        ),
    );

    let class = classify_role_change(Role::Shelter, Role::Adopter);
    println!(
        "- SHELTER -> ADOPTER needs confirmation: {}{}",
        class.requires_confirmation,
        class
            .message
            .map(|message| format!(" ({message})"))
            .unwrap_or_default()
    );
    let promoted = market.access.change_role(
        &admin,
        &UserId::new(ADOPTERS[1]),
        Role::Vendor,
        Some(Role::Adopter),
        "Opened a pet supply store",
        origin,
    )?;
    println!(
        "- {} is now {} (critical: {})",
        promoted.user.id, promoted.user.role, promoted.classification.requires_confirmation
    );

    if args.show_audit {
        print_audit(&market, &admin, &[target, UserId::new(ADOPTERS[1]), shelter])?;
    }
    if args.show_notifications {
        println!("\nNotifications");
        for notification in notifier.outbox() {
            println!("- to {}: {}", notification.recipient, notification.message);
        }
    }

    Ok(())
}

fn listing() -> PetListing {
    PetListing {
        name: "Biscuit".to_string(),
        species: "dog".to_string(),
        breed: Some("Corgi mix".to_string()),
        age_months: Some(20),
        sex: Sex::Female,
        description: "Gentle with kids, loves fetch.".to_string(),
        images: Vec::new(),
    }
}

/// Print an expected failure, or the success if it unexpectedly went through.
fn report<T: std::fmt::Debug>(step: &str, result: Result<T, LifecycleError>) {
    match result {
        Ok(value) => println!("- {step}: accepted {value:?}"),
        Err(error) => println!("- {step}: {} ({error})", error.code()),
    }
}

fn print_audit(market: &Marketplace, admin: &UserId, subjects: &[UserId]) -> Result<(), AppError> {
    println!("\nAudit trail");
    for subject in subjects {
        for record in market.audit.trail(admin, subject)? {
            let view = record.view();
            println!(
                "- {} {} {}: {} -> {} by {} \"{}\"",
                view.recorded_at.format("%H:%M:%S"),
                view.subject,
                view.action,
                view.old_value,
                view.new_value,
                view.actor,
                view.reason
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end() {
        run_demo(DemoArgs {
            show_notifications: true,
            show_audit: true,
        })
        .expect("demo completes");
    }
}
