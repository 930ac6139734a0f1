//! Rules for car listings, listing packages and their payments.

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::error::{DomainError, DomainResult, Violations};
use crate::helpers::slugify;
use crate::schema::{Car, CarInput, CarStatus, ListingPackage, PackageInput};

pub const MIN_CAR_YEAR: i64 = 1950;
/// Photos allowed on a listing without a package.
pub const DEFAULT_MAX_PHOTOS: i64 = 5;

pub fn validate_car(input: &CarInput, now: NaiveDateTime) -> DomainResult<()> {
    let mut v = Violations::new();
    v.check(!input.brand.trim().is_empty(), "Brand is required");
    v.check(!input.model.trim().is_empty(), "Model is required");
    v.check(
        (MIN_CAR_YEAR..=now.year() as i64 + 1).contains(&input.year),
        "Year is out of range",
    );
    v.check(input.price > 0, "Price must be positive");
    v.check(input.mileage >= 0, "Mileage cannot be negative");
    v.into_result()
}

pub fn ensure_owner(car: &Car, user_id: i64) -> DomainResult<()> {
    if car.seller_id == user_id {
        Ok(())
    } else {
        Err(DomainError::forbidden("You do not own this listing"))
    }
}

/// Sellers edit pending, available, rejected or expired listings. Edits send
/// the listing back to admin review.
pub fn ensure_editable(car: &Car) -> DomainResult<()> {
    match car.status {
        CarStatus::Reserved | CarStatus::Sold => Err(DomainError::state(format!(
            "A {} listing cannot be changed",
            car.status.as_str()
        ))),
        _ => Ok(()),
    }
}

pub fn ensure_deletable(car: &Car) -> DomainResult<()> {
    ensure_editable(car)
}

/// Admin review of a pending listing.
pub fn review_status(car: &Car, approve: bool) -> DomainResult<CarStatus> {
    if car.status != CarStatus::Pending {
        return Err(DomainError::state("Only pending listings can be reviewed"));
    }
    Ok(if approve {
        CarStatus::Available
    } else {
        CarStatus::Rejected
    })
}

pub fn can_refresh(car: &Car, package: Option<&ListingPackage>) -> DomainResult<()> {
    if car.status != CarStatus::Available {
        return Err(DomainError::state("Only available listings can be refreshed"));
    }
    let Some(package) = package else {
        return Err(DomainError::state("Listing has no package"));
    };
    if !package.allows_refresh {
        return Err(DomainError::state("Package does not allow refreshing"));
    }
    if car.refresh_count >= package.refresh_count {
        return Err(DomainError::state("No refreshes left for this listing"));
    }
    Ok(())
}

/// Photo limit of a listing. `None` means the package sets no limit.
pub fn photo_limit(car: &Car, package: Option<&ListingPackage>) -> Option<i64> {
    match (car.package_id, package) {
        (Some(_), Some(package)) => package.max_photos,
        _ => Some(DEFAULT_MAX_PHOTOS),
    }
}

pub fn is_listing_expired(car: &Car, now: NaiveDateTime) -> bool {
    car.status == CarStatus::Available && car.listing_end_date.is_some_and(|end| end < now)
}

/// Listing window opened by a package purchase.
pub fn activation_window(
    package: &ListingPackage,
    now: NaiveDateTime,
) -> (NaiveDateTime, NaiveDateTime) {
    (now, now + Duration::days(package.duration_days))
}

pub fn validate_package(input: &PackageInput) -> DomainResult<String> {
    let slug = match input.slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => slugify(s),
        _ => slugify(&input.name),
    };

    let mut v = Violations::new();
    v.check(
        input.name.trim().chars().count() >= 3,
        "Name must be at least 3 characters",
    );
    v.check(slug.len() >= 3, "Slug must be at least 3 characters");
    v.check(input.price >= 0, "Price cannot be negative");
    v.check(input.duration_days >= 1, "Duration must be at least 1 day");
    v.check(
        input.max_photos.is_none_or(|n| n >= 1),
        "Max photos must be at least 1",
    );
    v.check(input.priority_level >= 0, "Priority level cannot be negative");
    v.check(input.refresh_count >= 0, "Refresh count cannot be negative");
    v.check(input.display_order >= 0, "Display order cannot be negative");
    v.into_result()?;
    Ok(slug)
}
